//! Signer error taxonomy.
//!
//! Failures split into two tiers. [`RecoverableError`]s come from the
//! coordination layer being unavailable or racing another node; the caller
//! retries later. [`FatalInconsistency`] means an invariant of the log has been
//! broken and the process must stop rather than risk publishing a tree head
//! that contradicts one already signed.

use verity_certify::SignatureError;
use verity_core::Hash;
use verity_log::LeafError;
use verity_storage::StoreError;

/// Result type for signer operations
pub type SignerResult<T> = Result<T, SignerError>;

/// Errors reported by the consistency store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistentStoreError {
    /// The requested record has never been written
    #[error("{0} not found")]
    NotFound(String),

    /// A versioned write raced with another writer
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// A record with this key already exists
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The store could not be reached
    #[error("consistent store unavailable: {0}")]
    Unavailable(String),
}

/// Transient failures; the operation may be retried
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoverableError {
    /// The consistency store failed or a conditional write lost a race
    #[error(transparent)]
    ConsistentStore(#[from] ConsistentStoreError),

    /// The store handed out a negative next sequence number
    #[error("consistent store returned negative sequence number {0}")]
    NegativeSequenceNumber(i64),

    /// Another writer already recorded an entry at this sequence number
    #[error("sequence number {0} already in use in the local store")]
    SequenceNumberInUse(u64),

    /// The next sequence number was read before a newer mapping that uses it
    #[error("next sequence number {0} is already mapped")]
    StaleSequenceNumber(u64),
}

/// Broken log invariants; the process must stop
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalInconsistency {
    /// The stored mapping contains a hash or sequence number twice
    #[error("sequence mapping maps {hash} to {sequence_number} but one of them is already mapped")]
    DuplicateMapping {
        /// Offending hash
        hash: Hash,
        /// Offending sequence number
        sequence_number: u64,
    },

    /// The pending set contains the same entry twice
    #[error("entry {0} appears twice in the pending set")]
    DuplicateSequencing(Hash),

    /// Two entries were given the same sequence number in one run
    #[error("sequence number {0} assigned to two entries")]
    DuplicateSequenceNumber(u64),

    /// A pending entry arrived already carrying a sequence number
    #[error("pending entry {hash} already carries sequence number {sequence_number}")]
    AlreadySequenced {
        /// Entry hash
        hash: Hash,
        /// Sequence number it carried
        sequence_number: u64,
    },

    /// A mapped entry vanished before the serving tree head covered it
    #[error(
        "mapped entry {hash} at {sequence_number} vanished but serving tree size is {serving_tree_size}"
    )]
    VanishedAboveServing {
        /// Entry hash
        hash: Hash,
        /// Its mapped sequence number
        sequence_number: u64,
        /// Size of the serving tree head
        serving_tree_size: u64,
    },

    /// The lowest mapped sequence number lies above the serving tree head
    #[error("lowest mapped sequence number {lowest} exceeds serving tree size {serving_tree_size}")]
    MappingGap {
        /// Lowest sequence number in the new mapping
        lowest: u64,
        /// Size of the serving tree head
        serving_tree_size: u64,
    },

    /// A record was offered to the tree out of order
    #[error("expected sequence number {expected}, got {actual}")]
    OutOfOrderLeaf {
        /// Current leaf count
        expected: u64,
        /// Sequence number of the record
        actual: u64,
    },

    /// A record without a sequence number reached the tree
    #[error("entry {0} has no sequence number")]
    MissingSequenceNumber(Hash),

    /// An entry could not be serialized as a leaf
    #[error(transparent)]
    LeafEncoding(#[from] LeafError),

    /// The tree head could not be signed
    #[error("tree head signing failed: {0}")]
    SigningFailed(#[from] SignatureError),

    /// The local durable store failed
    #[error("local store failure: {0}")]
    LocalStore(#[from] StoreError),

    /// The node's last published state could not be read at startup
    #[error("cluster node state unreadable: {0}")]
    NodeStateUnreadable(ConsistentStoreError),
}

/// Any failure of a signer operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// Retry later
    #[error("recoverable: {0}")]
    Recoverable(#[from] RecoverableError),

    /// Stop the process
    #[error("fatal inconsistency: {0}")]
    Fatal(#[from] FatalInconsistency),
}

impl SignerError {
    /// Whether the process must stop
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Whether the operation may simply be retried
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

impl From<ConsistentStoreError> for SignerError {
    fn from(err: ConsistentStoreError) -> Self {
        Self::Recoverable(RecoverableError::ConsistentStore(err))
    }
}
