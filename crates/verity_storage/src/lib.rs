//! VERITY Storage
//!
//! The node-local durable record of sequenced entries, keyed by sequence
//! number. Records are created once and never rewritten.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod redb_store;
pub mod store;

pub use memory::MemoryEntryStore;
pub use redb_store::RedbEntryStore;
pub use store::{EntryScan, EntryStore, StoreConfig, StoreError, StoreResult};
