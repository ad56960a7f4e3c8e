//! Service layer: the relaxation state machine and its collaborators.

pub mod checkpoint;
pub mod classifier;
pub mod continuation;
pub mod controller;
pub mod worker;

pub use classifier::{FinalScalars, OutcomeClassifier};
pub use continuation::{ContinuationBuilder, ContinuationReason};
pub use controller::{ControllerOutcome, RelaxationController};
pub use worker::{Worker, WorkerTick};
