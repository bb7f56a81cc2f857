//! Reference history-store backends.

pub mod memory;

pub use memory::MemoryHistoryStore;
