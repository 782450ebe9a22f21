pub mod memory_store;
pub mod sled_store;

pub use memory_store::MemoryPendingStore;
pub use sled_store::SledPendingStore;
