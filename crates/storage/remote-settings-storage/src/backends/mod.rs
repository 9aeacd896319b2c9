//! Local Store backends

pub mod file;
pub mod memory;

pub use file::{FileStore, ResetReason, StoreStatus};
pub use memory::MemoryStore;
