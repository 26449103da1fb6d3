//! Local durable store contract.

use serde::{Deserialize, Serialize};
use verity_core::Hash;
use verity_log::LoggedEntry;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Lazy scan over sequenced records in ascending sequence order
pub type EntryScan<'a> = Box<dyn Iterator<Item = StoreResult<LoggedEntry>> + 'a>;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path
    pub path: String,
    /// Records fetched per read transaction while scanning
    pub scan_batch_size: usize,
}

impl StoreConfig {
    /// Create a config for a database file
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the scan batch size
    #[must_use]
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size.max(1);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ".verity/entries.redb".to_string(),
            scan_batch_size: 256,
        }
    }
}

/// Store error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A record already occupies this sequence number
    #[error("sequence number {0} already in use")]
    SequenceNumberAlreadyInUse(u64),

    /// The content hash is already stored under another sequence number
    #[error("entry {hash} already logged at sequence number {existing}")]
    EntryAlreadyLogged {
        /// Content hash
        hash: Hash,
        /// Sequence number it is stored under
        existing: u64,
    },

    /// Only sequenced entries can be recorded
    #[error("entry {0} has no sequence number")]
    MissingSequenceNumber(Hash),

    /// Record could not be encoded or decoded
    #[error("record encoding error: {0}")]
    Encoding(String),

    /// Underlying database failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Sequence-indexed, append-only record store.
///
/// Implementations take `&self` so a store can be shared with readers such as
/// a frontend serving entries by index.
pub trait EntryStore: Send + Sync {
    /// Durably record a sequenced entry.
    ///
    /// # Errors
    ///
    /// `SequenceNumberAlreadyInUse` if a record exists at that sequence number,
    /// `EntryAlreadyLogged` if the hash is stored elsewhere, otherwise a
    /// backend failure.
    fn create_sequenced_entry(&self, entry: &LoggedEntry) -> StoreResult<()>;

    /// Records from `start` in ascending sequence order, ending at the first gap.
    ///
    /// # Errors
    ///
    /// Returns error if the scan cannot be started; per-record failures are
    /// yielded by the iterator.
    fn scan_from(&self, start: u64) -> StoreResult<EntryScan<'_>>;

    /// Length of the gap-free prefix `0..n` of recorded sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    fn tree_size(&self) -> StoreResult<u64>;

    /// Fetch a record by sequence number.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    fn lookup_by_sequence(&self, sequence_number: u64) -> StoreResult<Option<LoggedEntry>>;

    /// Fetch a record by content hash.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    fn lookup_by_hash(&self, hash: &Hash) -> StoreResult<Option<LoggedEntry>>;
}

impl<S: EntryStore + ?Sized> EntryStore for std::sync::Arc<S> {
    fn create_sequenced_entry(&self, entry: &LoggedEntry) -> StoreResult<()> {
        (**self).create_sequenced_entry(entry)
    }

    fn scan_from(&self, start: u64) -> StoreResult<EntryScan<'_>> {
        (**self).scan_from(start)
    }

    fn tree_size(&self) -> StoreResult<u64> {
        (**self).tree_size()
    }

    fn lookup_by_sequence(&self, sequence_number: u64) -> StoreResult<Option<LoggedEntry>> {
        (**self).lookup_by_sequence(sequence_number)
    }

    fn lookup_by_hash(&self, hash: &Hash) -> StoreResult<Option<LoggedEntry>> {
        (**self).lookup_by_hash(hash)
    }
}
