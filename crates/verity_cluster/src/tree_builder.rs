//! Feeding sequenced records into the merkle tree.
//!
//! The tree only ever grows by its next leaf. A gap in the local store means
//! the record has not arrived yet, so the drain stops there; a record below the
//! tree's size means the store and the tree disagree about history.

use crate::error::FatalInconsistency;
use verity_core::Timestamp;
use verity_log::{CompactMerkleTree, LoggedEntry};
use verity_storage::EntryStore;

/// What a drain added to the tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Leaves appended
    pub appended: u64,
    /// Newest submission timestamp among appended entries
    pub max_timestamp: Option<Timestamp>,
}

/// Append `entry` as the tree's next leaf.
///
/// # Errors
///
/// Fatal if the entry is unsequenced, not the next leaf, or cannot be
/// serialized.
pub fn append_to_tree(
    tree: &mut CompactMerkleTree,
    entry: &LoggedEntry,
) -> Result<(), FatalInconsistency> {
    let leaf = check_next_leaf(tree, entry)?;
    tree.add_leaf(&leaf);
    Ok(())
}

/// Check that `entry` is the tree's next leaf and serialize it.
///
/// # Errors
///
/// Fatal if the entry is unsequenced, not the next leaf, or cannot be
/// serialized.
pub fn check_next_leaf(
    tree: &CompactMerkleTree,
    entry: &LoggedEntry,
) -> Result<Vec<u8>, FatalInconsistency> {
    let actual = entry
        .sequence_number
        .ok_or(FatalInconsistency::MissingSequenceNumber(entry.hash))?;
    let expected = tree.leaf_count();
    if actual != expected {
        return Err(FatalInconsistency::OutOfOrderLeaf { expected, actual });
    }
    Ok(entry.serialize_for_leaf()?)
}

/// Append every record that extends the tree from `local_store`, in order,
/// stopping at the first gap.
///
/// # Errors
///
/// Fatal if the store fails or yields a record below the tree's size.
pub fn drain_into_tree<E: EntryStore + ?Sized>(
    local_store: &E,
    tree: &mut CompactMerkleTree,
) -> Result<DrainOutcome, FatalInconsistency> {
    let mut outcome = DrainOutcome::default();
    for record in local_store.scan_from(tree.leaf_count())? {
        let record = record?;
        let actual = record
            .sequence_number
            .ok_or(FatalInconsistency::MissingSequenceNumber(record.hash))?;
        if actual > tree.leaf_count() {
            break;
        }
        append_to_tree(tree, &record)?;
        outcome.appended += 1;
        outcome.max_timestamp = outcome.max_timestamp.max(Some(record.timestamp));
    }
    Ok(outcome)
}
