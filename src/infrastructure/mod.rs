pub mod concurrency_gate;
pub mod kv_store;

pub use concurrency_gate::{ConcurrencyGate, GatePermit, GateStats};
pub use kv_store::{FileStore, KeyValueStore, MemoryStore};
