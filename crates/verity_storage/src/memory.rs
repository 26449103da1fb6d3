//! In-memory entry store.

use crate::store::{EntryScan, EntryStore, StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use verity_core::Hash;
use verity_log::LoggedEntry;

#[derive(Debug, Default)]
struct Inner {
    by_sequence: BTreeMap<u64, LoggedEntry>,
    by_hash: HashMap<Hash, u64>,
    contiguous: u64,
}

/// Entry store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    inner: RwLock<Inner>,
}

impl MemoryEntryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, gaps included
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_sequence.len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_sequence.is_empty()
    }

    /// All recorded sequence numbers in ascending order
    #[must_use]
    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.inner.read().by_sequence.keys().copied().collect()
    }
}

impl EntryStore for MemoryEntryStore {
    fn create_sequenced_entry(&self, entry: &LoggedEntry) -> StoreResult<()> {
        let seq = entry
            .sequence_number
            .ok_or(StoreError::MissingSequenceNumber(entry.hash))?;

        let mut inner = self.inner.write();
        if inner.by_sequence.contains_key(&seq) {
            return Err(StoreError::SequenceNumberAlreadyInUse(seq));
        }
        if let Some(existing) = inner.by_hash.get(&entry.hash) {
            return Err(StoreError::EntryAlreadyLogged {
                hash: entry.hash,
                existing: *existing,
            });
        }

        inner.by_sequence.insert(seq, entry.clone());
        inner.by_hash.insert(entry.hash, seq);
        while inner.by_sequence.contains_key(&inner.contiguous) {
            inner.contiguous += 1;
        }
        Ok(())
    }

    fn scan_from(&self, start: u64) -> StoreResult<EntryScan<'_>> {
        let inner = self.inner.read();
        let mut run = Vec::new();
        let mut expected = start;
        for (seq, entry) in inner.by_sequence.range(start..) {
            if *seq != expected {
                break;
            }
            run.push(Ok(entry.clone()));
            expected += 1;
        }
        Ok(Box::new(run.into_iter()))
    }

    fn tree_size(&self) -> StoreResult<u64> {
        Ok(self.inner.read().contiguous)
    }

    fn lookup_by_sequence(&self, sequence_number: u64) -> StoreResult<Option<LoggedEntry>> {
        Ok(self.inner.read().by_sequence.get(&sequence_number).cloned())
    }

    fn lookup_by_hash(&self, hash: &Hash) -> StoreResult<Option<LoggedEntry>> {
        let inner = self.inner.read();
        Ok(inner
            .by_hash
            .get(hash)
            .and_then(|seq| inner.by_sequence.get(seq))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use verity_core::Timestamp;

    fn sequenced(seq: u64) -> LoggedEntry {
        LoggedEntry::from_leaf(format!("entry-{seq}").into_bytes(), Timestamp::from_millis(seq))
            .with_sequence_number(seq)
    }

    #[test]
    fn test_store_new() {
        let store = MemoryEntryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.tree_size().unwrap(), 0);
    }

    #[test]
    fn test_create_and_lookup() {
        let store = MemoryEntryStore::new();
        let entry = sequenced(0);
        store.create_sequenced_entry(&entry).unwrap();

        assert_eq!(store.lookup_by_sequence(0).unwrap(), Some(entry.clone()));
        assert_eq!(store.lookup_by_hash(&entry.hash).unwrap(), Some(entry));
        assert_eq!(store.lookup_by_sequence(1).unwrap(), None);
    }

    #[test]
    fn test_unsequenced_rejected() {
        let store = MemoryEntryStore::new();
        let entry = LoggedEntry::from_leaf(b"x".to_vec(), Timestamp::EPOCH);
        assert!(matches!(
            store.create_sequenced_entry(&entry),
            Err(StoreError::MissingSequenceNumber(_))
        ));
    }

    #[test]
    fn test_sequence_collision() {
        let store = MemoryEntryStore::new();
        store.create_sequenced_entry(&sequenced(0)).unwrap();
        let other = LoggedEntry::from_leaf(b"other".to_vec(), Timestamp::EPOCH).with_sequence_number(0);
        assert_eq!(
            store.create_sequenced_entry(&other),
            Err(StoreError::SequenceNumberAlreadyInUse(0))
        );
    }

    #[test]
    fn test_hash_collision() {
        let store = MemoryEntryStore::new();
        let entry = sequenced(0);
        store.create_sequenced_entry(&entry).unwrap();
        let again = entry.clone().with_sequence_number(1);
        assert!(matches!(
            store.create_sequenced_entry(&again),
            Err(StoreError::EntryAlreadyLogged { existing: 0, .. })
        ));
    }

    #[test]
    fn test_tree_size_tracks_contiguous_prefix() {
        let store = MemoryEntryStore::new();
        store.create_sequenced_entry(&sequenced(0)).unwrap();
        store.create_sequenced_entry(&sequenced(2)).unwrap();
        assert_eq!(store.tree_size().unwrap(), 1);

        store.create_sequenced_entry(&sequenced(1)).unwrap();
        assert_eq!(store.tree_size().unwrap(), 3);
        assert_eq!(store.sequence_numbers(), vec![0, 1, 2]);
    }

    #[test]
    fn test_scan_stops_at_gap() {
        let store = MemoryEntryStore::new();
        for seq in [3, 4, 6] {
            store.create_sequenced_entry(&sequenced(seq)).unwrap();
        }
        let seqs: Vec<u64> = store
            .scan_from(3)
            .unwrap()
            .map(|r| r.unwrap().sequence_number.unwrap())
            .collect();
        assert_eq!(seqs, vec![3, 4]);

        assert_eq!(store.scan_from(5).unwrap().count(), 0);
        assert_eq!(store.scan_from(6).unwrap().count(), 1);
    }

    proptest! {
        #[test]
        fn prop_tree_size_is_gap_free_prefix(seqs in prop::collection::btree_set(0u64..24, 0..24)) {
            let store = MemoryEntryStore::new();
            // Insert in descending order so the prefix only closes at the end.
            for seq in seqs.iter().rev() {
                store.create_sequenced_entry(&sequenced(*seq)).unwrap();
            }

            let expected = (0u64..).take_while(|n| seqs.contains(n)).count() as u64;
            prop_assert_eq!(store.tree_size().unwrap(), expected);
            prop_assert_eq!(store.scan_from(0).unwrap().count() as u64, expected);
            let recorded: BTreeSet<u64> = store.sequence_numbers().into_iter().collect();
            prop_assert_eq!(recorded, seqs);
        }
    }
}
