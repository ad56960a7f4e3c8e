//! Result store implementations.

pub mod fs;
pub mod memory;

pub use fs::FsResultStore;
pub use memory::MemoryResultStore;
