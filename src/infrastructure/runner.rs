//! Subprocess runner: launches the solver wrapper with a hard deadline.
//!
//! The solver always runs through a generated jobscript so site-specific
//! environment setup (module loads and the like) composes with the
//! wrapper command exactly as it would in a hand-written submission
//! script. The deadline is enforced by killing the process group; the
//! child is never trusted to watch the clock itself.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::models::RelaxationJob;
use crate::domain::ports::{RunCapture, SolverAdapter, SolverRunner};

pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Generate the jobscript for one run. Login-shell shebang: the
    /// wrapper scripts live behind site module systems that only
    /// initialize in login shells.
    fn write_jobscript(
        &self,
        adapter: &dyn SolverAdapter,
        job: &RelaxationJob,
        workdir: &Path,
    ) -> DomainResult<PathBuf> {
        let mut script = String::from("#!/bin/bash -l\n");
        for line in adapter.prepend_command() {
            script.push_str(line);
            script.push('\n');
        }
        script.push_str(&adapter.build_command(job).join(" "));
        script.push('\n');
        for line in adapter.append_command() {
            script.push_str(line);
            script.push('\n');
        }

        let path = workdir.join(format!("run_{}.sh", job.structure_id));
        std::fs::write(&path, script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(path)
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SolverRunner for SubprocessRunner {
    async fn prepare_inputs(
        &self,
        adapter: &dyn SolverAdapter,
        job: &RelaxationJob,
        workdir: &Path,
    ) -> DomainResult<()> {
        for (name, content) in adapter.input_files(job) {
            let path = workdir.join(&name);
            if !path.exists() {
                tokio::fs::write(&path, content).await?;
                debug!(file = %name, "input materialized");
            }
        }
        Ok(())
    }

    async fn run(
        &self,
        adapter: &dyn SolverAdapter,
        job: &RelaxationJob,
        workdir: &Path,
        deadline_secs: u64,
    ) -> DomainResult<RunCapture> {
        let script = self.write_jobscript(adapter, job, workdir)?;
        debug!(script = %script.display(), deadline_secs, "launching solver");

        let mut cmd = Command::new("/bin/bash");
        cmd.arg(&script)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group: the solver is a grandchild of the jobscript
        // shell and must die with it at the deadline.
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd
            .spawn()
            .map_err(|e| RelaxError::Spawn(e.to_string()))?;

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| RelaxError::Spawn("stdout pipe unavailable".to_string()))?;
        let reader = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout_pipe.read_to_string(&mut buf).await;
            buf
        });

        let was_killed = match timeout(Duration::from_secs(deadline_secs), child.wait()).await {
            Ok(status) => {
                let status = status?;
                if !status.success() {
                    warn!(code = ?status.code(), "solver exited non-zero");
                }
                false
            }
            Err(_) => {
                warn!(deadline_secs, "deadline expired; killing solver process group");
                #[cfg(unix)]
                if let Some(pid) = child.id() {
                    use nix::sys::signal::{killpg, Signal};
                    use nix::unistd::Pid;
                    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
                child.kill().await?;
                let _ = child.wait().await;
                true
            }
        };

        let stdout = reader
            .await
            .map_err(|e| RelaxError::Spawn(format!("stdout collection failed: {e}")))?;
        Ok(RunCapture { stdout, was_killed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{InputState, SolverConfig};
    use crate::infrastructure::solvers::CastepAdapter;
    use tempfile::TempDir;

    fn job() -> RelaxationJob {
        RelaxationJob::new(
            "s1",
            InputState {
                cell: "cell content\n".to_string(),
                param: "param content\n".to_string(),
            },
            100,
        )
    }

    #[tokio::test]
    async fn test_prepare_inputs_never_clobbers() {
        let dir = TempDir::new().unwrap();
        let adapter = CastepAdapter::from_config(&SolverConfig::default());
        let runner = SubprocessRunner::new();

        std::fs::write(dir.path().join("s1.cell"), "checkpointed content\n").unwrap();
        runner
            .prepare_inputs(&adapter, &job(), dir.path())
            .await
            .unwrap();

        let cell = std::fs::read_to_string(dir.path().join("s1.cell")).unwrap();
        assert_eq!(cell, "checkpointed content\n", "existing file untouched");
        let param = std::fs::read_to_string(dir.path().join("s1.param")).unwrap();
        assert_eq!(param, "param content\n", "missing file written");
    }

    #[test]
    fn test_jobscript_layout() {
        let dir = TempDir::new().unwrap();
        let adapter = CastepAdapter::from_config(&SolverConfig {
            prepend_command: vec!["module load castep".to_string()],
            append_command: vec!["rm -f *.check".to_string()],
            ..Default::default()
        });
        let runner = SubprocessRunner::new();
        let path = runner.write_jobscript(&adapter, &job(), dir.path()).unwrap();

        let script = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "#!/bin/bash -l");
        assert_eq!(lines[1], "module load castep");
        assert!(lines[2].starts_with("castep_relax 100"));
        assert_eq!(lines[3], "rm -f *.check");
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let dir = TempDir::new().unwrap();
        // The wrapper line itself fails (castep_relax is not on PATH
        // here); the prepend echo still proves stdout capture works.
        let adapter = CastepAdapter::from_config(&SolverConfig {
            prepend_command: vec!["echo Pressure: 0.0".to_string()],
            executable: "true".to_string(),
            ..Default::default()
        });
        let runner = SubprocessRunner::new();
        let capture = runner.run(&adapter, &job(), dir.path(), 30).await.unwrap();
        assert!(capture.stdout.contains("Pressure: 0.0"));
        assert!(!capture.was_killed);
    }

    #[tokio::test]
    async fn test_deadline_kills_process() {
        let dir = TempDir::new().unwrap();
        let adapter = CastepAdapter::from_config(&SolverConfig {
            prepend_command: vec!["sleep 600".to_string()],
            ..Default::default()
        });
        let runner = SubprocessRunner::new();
        let capture = runner.run(&adapter, &job(), dir.path(), 1).await.unwrap();
        assert!(capture.was_killed);
    }

    #[tokio::test]
    async fn test_deadline_kills_whole_process_group() {
        let dir = TempDir::new().unwrap();
        // A backgrounded grandchild that would write a marker after the
        // deadline must die with the group.
        let adapter = CastepAdapter::from_config(&SolverConfig {
            prepend_command: vec![
                "(sleep 2; touch survived.marker) &".to_string(),
                "sleep 600".to_string(),
            ],
            ..Default::default()
        });
        let runner = SubprocessRunner::new();
        let capture = runner.run(&adapter, &job(), dir.path(), 1).await.unwrap();
        assert!(capture.was_killed);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(
            !dir.path().join("survived.marker").exists(),
            "background grandchild outlived the deadline"
        );
    }
}
