//! Domain layer: models, errors, and port contracts.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainResult, RelaxError};
