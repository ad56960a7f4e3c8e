//! Checkpoint extraction and input-file surgery.
//!
//! The solver writes a trajectory file alongside its run; the extractor
//! takes the last recorded snapshot and re-serializes it into the same
//! textual input format the solver consumes, merging it with all
//! non-geometry directives of the original input, which pass through
//! unchanged. Every rewrite of the canonical input is atomic: write to a
//! temp name, then rename.

use std::fs;
use std::path::Path;

use crate::domain::errors::{DomainResult, RelaxError};

/// Trajectory files store lengths in Bohr; the input format wants Angstrom.
const BOHR_TO_ANGSTROM: f64 = 0.529_177_210_8;

/// Last snapshot recorded in a trajectory file.
#[derive(Debug, Clone, PartialEq)]
struct GeomSnapshot {
    cell: Vec<[f64; 3]>,
    species: Vec<String>,
    positions: Vec<[f64; 3]>,
}

fn cell_file(structure_id: &str) -> String {
    format!("{structure_id}.cell")
}

/// Whether the input carries spin annotations the trajectory format
/// cannot carry forward.
pub fn has_spin(cell: &str) -> bool {
    cell.contains("SPIN=")
}

/// Extract the latest geometry for `structure_id` as full input-file
/// content, or `None` when no trajectory exists (the solver died before
/// its first checkpoint; callers treat that as an error, not progress).
///
/// Spin rule: if the original input carries `SPIN=` annotations, the
/// pre-run input is returned unchanged rather than a geometry that
/// silently drops them. Precision over progress, by explicit rule.
pub fn extract_latest_geometry(workdir: &Path, structure_id: &str) -> DomainResult<Option<String>> {
    let original = fs::read_to_string(workdir.join(cell_file(structure_id)))?;
    if has_spin(&original) {
        return Ok(Some(original));
    }

    let geom_path = workdir.join(format!("{structure_id}.geom"));
    if !geom_path.is_file() {
        return Ok(None);
    }
    let geom_content = fs::read_to_string(&geom_path)?;
    let Some(snapshot) = parse_geom(&geom_content)? else {
        return Ok(None);
    };

    let (lattice, positions) = snapshot_blocks(&snapshot);
    Ok(Some(merge_geometry(&lattice, &positions, &original)))
}

/// Atomically replace the canonical cell file.
pub fn write_cell_atomic(workdir: &Path, structure_id: &str, content: &str) -> DomainResult<()> {
    atomic_write(&workdir.join(cell_file(structure_id)), content)
}

/// Propagate the solver's output structure (`<name>-out.cell`) into the
/// canonical input between passes. Returns `false` when no output
/// structure exists. The output file is removed after the swap so old and
/// new geometry never coexist ambiguously.
pub fn push_cell(workdir: &Path, structure_id: &str) -> DomainResult<bool> {
    let out_path = workdir.join(format!("{structure_id}-out.cell"));
    if !out_path.is_file() {
        return Ok(false);
    }
    let out_content = fs::read_to_string(&out_path)?;
    let cell_content = fs::read_to_string(workdir.join(cell_file(structure_id)))?;

    let lattice = extract_block(&out_content, "LAT", &["FIX_VOL", "ANG"]).ok_or_else(|| {
        RelaxError::Parse(format!("no lattice block in {}", out_path.display()))
    })?;
    let positions = extract_block(&out_content, "POS", &[]).ok_or_else(|| {
        RelaxError::Parse(format!("no positions block in {}", out_path.display()))
    })?;

    let merged = merge_geometry(&lattice, &positions, &cell_content);
    write_cell_atomic(workdir, structure_id, &merged)?;
    fs::remove_file(&out_path)?;
    Ok(true)
}

/// Remove a leftover output structure without propagating it. Used when a
/// truncated run must not be mistaken for a converged one.
pub fn discard_out_cell(workdir: &Path, structure_id: &str) -> DomainResult<bool> {
    let out_path = workdir.join(format!("{structure_id}-out.cell"));
    if out_path.is_file() {
        fs::remove_file(&out_path)?;
        return Ok(true);
    }
    Ok(false)
}

/// New geometry blocks first, then everything from the original input
/// except its old lattice and positions blocks.
fn merge_geometry(lattice_block: &str, positions_block: &str, original: &str) -> String {
    let rest = strip_blocks(original, &["LAT", "POS"]);
    let mut out = String::new();
    out.push_str(lattice_block);
    out.push('\n');
    out.push_str(positions_block);
    out.push('\n');
    out.push_str(rest.trim_start_matches('\n'));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Comment out any cell-constraints block and pin the cell.
pub fn constraints_on(cell: &str) -> String {
    let mut out = Vec::new();
    let mut in_block = false;
    for line in cell.lines() {
        let upper = line.trim_start().to_uppercase();
        if upper.starts_with("%BLOCK CELL_CONSTRAINTS") {
            in_block = true;
        }
        if in_block {
            out.push(format!("#{line}"));
            if upper.starts_with("%ENDBLOCK CELL_CONSTRAINTS") {
                in_block = false;
            }
        } else {
            out.push(line.to_string());
        }
    }
    out.push(String::new());
    out.push("FIX_ALL_CELL: TRUE".to_string());
    out.join("\n") + "\n"
}

/// Uncomment any cell-constraints block and drop the pin.
pub fn constraints_off(cell: &str) -> String {
    let mut out = Vec::new();
    let mut in_block = false;
    for line in cell.lines() {
        let stripped = line.strip_prefix('#').unwrap_or(line);
        let upper = stripped.trim_start().to_uppercase();
        if upper.contains("FIX_ALL_CELL") {
            continue;
        }
        if upper.starts_with("%BLOCK CELL_CONSTRAINTS") {
            in_block = true;
        }
        if in_block {
            out.push(stripped.to_string());
            if upper.starts_with("%ENDBLOCK CELL_CONSTRAINTS") {
                in_block = false;
            }
        } else {
            out.push(line.to_string());
        }
    }
    let mut joined = out.join("\n");
    if !joined.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

const ITER_CAP_MARKER: &str = "#MARKED";

/// Temporarily cap the solver's internal iteration limit for an
/// exploratory pass. The original directive is commented out, not lost.
pub fn set_short_iteration_cap(param: &str, cap: u32) -> String {
    let mut out = Vec::new();
    for line in param.lines() {
        if line.to_lowercase().contains("geom_max_iter") && !line.starts_with('#') {
            out.push(format!("#{line}"));
        } else {
            out.push(line.to_string());
        }
    }
    out.push(format!("geom_max_iter: {cap} {ITER_CAP_MARKER}"));
    out.join("\n") + "\n"
}

/// Restore the iteration cap supplied in the original control file,
/// dropping any exploratory override. Safe to call on content that was
/// never overridden.
pub fn restore_iteration_cap(param: &str) -> String {
    let mut out = Vec::new();
    for line in param.lines() {
        if line.contains(ITER_CAP_MARKER) {
            continue;
        }
        if line.starts_with('#') && line.to_lowercase().contains("geom_max_iter") {
            out.push(line[1..].to_string());
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n") + "\n"
}

/// Normalize a control file before the first run: drop stale exploratory
/// overrides (a crash can leave one behind) and make sure the solver is
/// asked to write output structures at all.
pub fn normalize_param(param: &str) -> String {
    let restored = restore_iteration_cap(param);
    if restored.to_lowercase().contains("write_cell_structure") {
        restored
    } else {
        format!("{restored}write_cell_structure : true\n")
    }
}

/// Write to a sibling temp name, then rename over the target.
fn atomic_write(path: &Path, content: &str) -> DomainResult<()> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tmp_name.push_str(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Extract a `%BLOCK <prefix>...` section including its enclosures,
/// dropping lines containing any of `excludes`.
fn extract_block(content: &str, prefix: &str, excludes: &[&str]) -> Option<String> {
    let begin = format!("%BLOCK {prefix}");
    let end = format!("%ENDBLOCK {prefix}");
    let mut lines = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let upper = line.trim_start().to_uppercase();
        if upper.starts_with(&begin) {
            in_block = true;
        }
        if in_block {
            if !excludes.iter().any(|tok| upper.contains(tok)) {
                lines.push(line.to_string());
            }
            if upper.starts_with(&end) {
                return Some(lines.join("\n"));
            }
        }
    }
    None
}

/// Remove `%BLOCK <prefix>` sections for every prefix given; everything
/// else passes through byte-for-byte.
fn strip_blocks(content: &str, prefixes: &[&str]) -> String {
    let mut out = Vec::new();
    let mut skipping: Option<String> = None;
    for line in content.lines() {
        let upper = line.trim_start().to_uppercase();
        if let Some(prefix) = &skipping {
            if upper.starts_with(&format!("%ENDBLOCK {prefix}")) {
                skipping = None;
            }
            continue;
        }
        if let Some(prefix) = prefixes
            .iter()
            .find(|p| upper.starts_with(&format!("%BLOCK {}", **p)))
        {
            skipping = Some((*prefix).to_string());
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

/// Parse a trajectory file and return its last snapshot, if any.
fn parse_geom(content: &str) -> DomainResult<Option<GeomSnapshot>> {
    let mut last = None;
    let mut cur_cell: Vec<[f64; 3]> = Vec::new();
    let mut cur_species: Vec<String> = Vec::new();
    let mut cur_pos: Vec<[f64; 3]> = Vec::new();
    let mut in_header = false;

    let mut flush = |cell: &mut Vec<[f64; 3]>,
                     species: &mut Vec<String>,
                     pos: &mut Vec<[f64; 3]>,
                     last: &mut Option<GeomSnapshot>| {
        if !cell.is_empty() {
            *last = Some(GeomSnapshot {
                cell: std::mem::take(cell),
                species: std::mem::take(species),
                positions: std::mem::take(pos),
            });
        }
    };

    for line in content.lines() {
        let lower = line.to_lowercase();
        if lower.contains("begin header") {
            in_header = true;
            continue;
        }
        if lower.contains("end header") {
            in_header = false;
            continue;
        }
        if in_header {
            continue;
        }

        let toks: Vec<&str> = line.split_whitespace().collect();
        if line.contains("<-- h") && toks.len() >= 3 {
            cur_cell.push(parse_triplet(&toks[0..3])?);
        } else if line.contains("<-- R") && toks.len() >= 5 {
            cur_species.push(toks[0].to_string());
            cur_pos.push(parse_triplet(&toks[2..5])?);
        } else if line.trim().is_empty() {
            flush(&mut cur_cell, &mut cur_species, &mut cur_pos, &mut last);
        }
    }
    flush(&mut cur_cell, &mut cur_species, &mut cur_pos, &mut last);
    Ok(last)
}

fn parse_triplet(toks: &[&str]) -> DomainResult<[f64; 3]> {
    let mut out = [0.0; 3];
    for (slot, tok) in out.iter_mut().zip(toks) {
        *slot = tok
            .parse::<f64>()
            .map_err(|_| RelaxError::Parse(format!("bad numeric field in trajectory: {tok}")))?
            * BOHR_TO_ANGSTROM;
    }
    Ok(out)
}

fn snapshot_blocks(snapshot: &GeomSnapshot) -> (String, String) {
    let mut lattice = vec!["%BLOCK LATTICE_CART".to_string()];
    for row in &snapshot.cell {
        lattice.push(format!("{:.7} {:.7} {:.7}", row[0], row[1], row[2]));
    }
    lattice.push("%ENDBLOCK LATTICE_CART".to_string());

    let mut positions = vec!["%BLOCK POSITIONS_ABS".to_string()];
    for (species, pos) in snapshot.species.iter().zip(&snapshot.positions) {
        positions.push(format!("{species} {:.7} {:.7} {:.7}", pos[0], pos[1], pos[2]));
    }
    positions.push("%ENDBLOCK POSITIONS_ABS".to_string());

    (lattice.join("\n"), positions.join("\n"))
}
