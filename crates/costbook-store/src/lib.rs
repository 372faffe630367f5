//! Storage backends for costbook
//!
//! Two [`LedgerStore`](costbook_core::store::LedgerStore) implementations
//! share one serializable state model:
//!
//! - [`MemoryStore`]: process-local, with commit failure and write delay injection for tests
//! - [`JsonFileStore`]: a single JSON document replaced atomically on every write

pub mod json_file;
pub mod memory;
pub mod state;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use state::{LedgerState, UserRecord};
