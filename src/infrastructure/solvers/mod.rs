//! Solver adapters, one per family, selected by configuration.

pub mod castep;
pub mod pp3;

use std::sync::Arc;

use crate::domain::models::{SolverConfig, SolverFamily};
use crate::domain::ports::SolverAdapter;

pub use castep::CastepAdapter;
pub use pp3::Pp3Adapter;

/// Build the adapter for the configured family.
pub fn from_config(config: &SolverConfig) -> Arc<dyn SolverAdapter> {
    match config.family {
        SolverFamily::Castep => Arc::new(CastepAdapter::from_config(config)),
        SolverFamily::Pp3 => Arc::new(Pp3Adapter::from_config(config)),
    }
}
