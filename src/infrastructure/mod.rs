//! Infrastructure adapters implementing the domain ports.

pub mod config;
pub mod logging;
pub mod oracle;
pub mod queue;
pub mod runner;
pub mod solvers;
pub mod store;

pub use config::ConfigLoader;
pub use logging::LoggerImpl;
pub use queue::MemoryJobQueue;
pub use runner::SubprocessRunner;
pub use store::{FsResultStore, MemoryResultStore};
