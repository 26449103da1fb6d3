//! Log entries and their sequencing order.
//!
//! A [`LoggedEntry`] starts life pending (no sequence number) and becomes a
//! sequenced record once the allocator assigns it a permanent position.

use crate::encoding::CanonicalEncode;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use verity_core::{Hash, Timestamp};

/// Leaf format version written into every serialized leaf
const LEAF_VERSION_V1: u8 = 0;

/// Leaf type for timestamped entries
const LEAF_TYPE_TIMESTAMPED_ENTRY: u8 = 0;

/// Largest payload a leaf can carry (24-bit length prefix)
pub const MAX_LEAF_PAYLOAD: usize = (1 << 24) - 1;

/// A log entry, pending or sequenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEntry {
    /// Content hash, the key under which the entry is mapped to a sequence number
    pub hash: Hash,
    /// Submission timestamp supplied by the submitter
    pub timestamp: Timestamp,
    /// Opaque leaf payload
    pub payload: Vec<u8>,
    /// Permanent position in the log, once assigned
    pub sequence_number: Option<u64>,
}

impl LoggedEntry {
    /// Create a pending entry with an explicit content hash
    #[must_use]
    pub fn new(hash: Hash, timestamp: Timestamp, payload: Vec<u8>) -> Self {
        Self {
            hash,
            timestamp,
            payload,
            sequence_number: None,
        }
    }

    /// Create a pending entry whose content hash is the SHA-256 of its payload
    #[must_use]
    pub fn from_leaf(payload: Vec<u8>, timestamp: Timestamp) -> Self {
        Self::new(Hash::compute(&payload), timestamp, payload)
    }

    /// Attach a sequence number
    #[must_use]
    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    /// Whether a sequence number has been assigned
    #[must_use]
    pub const fn is_sequenced(&self) -> bool {
        self.sequence_number.is_some()
    }

    /// Serialize into the byte string appended to the merkle tree.
    ///
    /// Layout: `version(1) | leaf_type(1) | timestamp(u64 BE) | len(u24 BE) | payload`.
    ///
    /// # Errors
    ///
    /// Returns error if the payload does not fit the 24-bit length prefix
    pub fn serialize_for_leaf(&self) -> Result<Vec<u8>, LeafError> {
        let len = self.payload.len();
        if len > MAX_LEAF_PAYLOAD {
            return Err(LeafError::PayloadTooLarge { size: len });
        }

        let mut leaf = Vec::with_capacity(2 + 8 + 3 + len);
        leaf.push(LEAF_VERSION_V1);
        leaf.push(LEAF_TYPE_TIMESTAMPED_ENTRY);
        leaf.extend_from_slice(&self.timestamp.as_millis().to_be_bytes());
        // Checked above, the top byte of the u32 is zero.
        leaf.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
        leaf.extend_from_slice(&self.payload);
        Ok(leaf)
    }
}

impl CanonicalEncode for LoggedEntry {}

/// Leaf serialization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeafError {
    /// Payload exceeds the 24-bit length prefix
    #[error("leaf payload of {size} bytes exceeds {MAX_LEAF_PAYLOAD}")]
    PayloadTooLarge {
        /// Payload size in bytes
        size: usize,
    },
}

/// Total order used to assign sequence numbers to pending entries.
///
/// Ascending submission timestamp, ties broken by ascending content hash
/// (byte-wise). The result is independent of the order entries arrived in.
#[must_use]
pub fn pending_entries_order(lhs: &LoggedEntry, rhs: &LoggedEntry) -> Ordering {
    lhs.timestamp
        .cmp(&rhs.timestamp)
        .then_with(|| lhs.hash.cmp(&rhs.hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(tag: u8, ts: u64) -> LoggedEntry {
        LoggedEntry::new(Hash::from_bytes([tag; 32]), Timestamp::from_millis(ts), vec![tag])
    }

    #[test]
    fn test_from_leaf_hashes_payload() {
        let e = LoggedEntry::from_leaf(b"cert".to_vec(), Timestamp::from_millis(1));
        assert_eq!(e.hash, Hash::compute(b"cert"));
        assert!(!e.is_sequenced());
        assert!(e.with_sequence_number(3).is_sequenced());
    }

    #[test]
    fn test_serialize_for_leaf_layout() {
        let e = LoggedEntry::from_leaf(vec![0xaa, 0xbb], Timestamp::from_millis(0x0102));
        let leaf = e.serialize_for_leaf().unwrap();
        assert_eq!(
            leaf,
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 2, 0xaa, 0xbb]
        );
    }

    #[test]
    fn test_serialize_for_leaf_ignores_sequence_number() {
        let e = LoggedEntry::from_leaf(b"x".to_vec(), Timestamp::from_millis(5));
        let sequenced = e.clone().with_sequence_number(9);
        assert_eq!(
            e.serialize_for_leaf().unwrap(),
            sequenced.serialize_for_leaf().unwrap()
        );
    }

    #[test]
    fn test_serialize_for_leaf_too_large() {
        let e = LoggedEntry::from_leaf(vec![0u8; MAX_LEAF_PAYLOAD + 1], Timestamp::EPOCH);
        assert!(matches!(
            e.serialize_for_leaf(),
            Err(LeafError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_order_by_timestamp_first() {
        let early = entry(9, 100);
        let late = entry(1, 200);
        assert_eq!(pending_entries_order(&early, &late), Ordering::Less);
        assert_eq!(pending_entries_order(&late, &early), Ordering::Greater);
    }

    #[test]
    fn test_order_hash_breaks_ties() {
        let a = entry(1, 100);
        let b = entry(2, 100);
        assert_eq!(pending_entries_order(&a, &b), Ordering::Less);
        assert_eq!(pending_entries_order(&a, &a), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn prop_order_independent_of_arrival(
            specs in proptest::collection::vec((any::<u8>(), 0u64..50), 0..40),
            seed in any::<u64>(),
        ) {
            let entries: Vec<LoggedEntry> = specs.iter().map(|(t, ts)| entry(*t, *ts)).collect();

            let mut sorted = entries.clone();
            sorted.sort_by(pending_entries_order);

            // Deterministic shuffle driven by the seed
            let mut shuffled = entries;
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let j = (state % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }
            shuffled.sort_by(pending_entries_order);

            let lhs: Vec<_> = sorted.iter().map(|e| (e.timestamp, e.hash)).collect();
            let rhs: Vec<_> = shuffled.iter().map(|e| (e.timestamp, e.hash)).collect();
            prop_assert_eq!(lhs, rhs);
        }
    }
}
