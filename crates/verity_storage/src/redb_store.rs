//! Durable entry store backed by redb.
//!
//! ## Storage Format
//!
//! - `entries`: sequence number -> postcard-encoded [`LoggedEntry`]
//! - `entry_hashes`: content hash -> sequence number
//! - `meta`: `contiguous_size` -> length of the gap-free prefix
//!
//! All three tables are updated in one write transaction per record.

use crate::store::{EntryScan, EntryStore, StoreConfig, StoreError, StoreResult};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;
use verity_core::Hash;
use verity_log::{CanonicalDecode, CanonicalEncode, LoggedEntry};

const ENTRIES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("entries");

const HASH_INDEX_TABLE: TableDefinition<&[u8], u64> = TableDefinition::new("entry_hashes");

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const CONTIGUOUS_SIZE_KEY: &str = "contiguous_size";

fn backend<E: Into<redb::Error>>(err: E) -> StoreError {
    StoreError::Backend(err.into().to_string())
}

fn decode_entry(bytes: &[u8]) -> StoreResult<LoggedEntry> {
    LoggedEntry::decode(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
}

/// Entry store persisted in a redb database file
pub struct RedbEntryStore {
    db: Database,
    scan_batch_size: usize,
}

impl RedbEntryStore {
    /// Open (or create) the store described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or its tables created
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Self::open_path(&config.path, config.scan_batch_size)
    }

    /// Open (or create) a store at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or its tables created
    pub fn open_path(path: impl AsRef<Path>, scan_batch_size: usize) -> StoreResult<Self> {
        let db = Database::create(path.as_ref()).map_err(backend)?;

        // Ensure tables exist so read transactions can open them
        let write_txn = db.begin_write().map_err(backend)?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
            let _ = write_txn.open_table(HASH_INDEX_TABLE).map_err(backend)?;
            let _ = write_txn.open_table(META_TABLE).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        debug!(path = %path.as_ref().display(), "opened entry store");
        Ok(Self {
            db,
            scan_batch_size: scan_batch_size.max(1),
        })
    }

    /// Read up to `limit` consecutive records starting at `start`
    fn read_batch(&self, start: u64, limit: usize) -> StoreResult<Vec<LoggedEntry>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(backend)?;

        let mut batch = Vec::new();
        let mut expected = start;
        for result in table.range(start..).map_err(backend)? {
            let (key, value) = result.map_err(backend)?;
            if key.value() != expected || batch.len() == limit {
                break;
            }
            batch.push(decode_entry(value.value())?);
            expected += 1;
        }
        Ok(batch)
    }
}

impl EntryStore for RedbEntryStore {
    fn create_sequenced_entry(&self, entry: &LoggedEntry) -> StoreResult<()> {
        let seq = entry
            .sequence_number
            .ok_or(StoreError::MissingSequenceNumber(entry.hash))?;
        let encoded = entry
            .encode()
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(backend)?;
        {
            let mut entries = write_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
            let mut hashes = write_txn.open_table(HASH_INDEX_TABLE).map_err(backend)?;
            let mut meta = write_txn.open_table(META_TABLE).map_err(backend)?;

            if entries.get(seq).map_err(backend)?.is_some() {
                return Err(StoreError::SequenceNumberAlreadyInUse(seq));
            }
            let existing = hashes
                .get(entry.hash.as_bytes().as_slice())
                .map_err(backend)?
                .map(|guard| guard.value());
            if let Some(existing) = existing {
                return Err(StoreError::EntryAlreadyLogged {
                    hash: entry.hash,
                    existing,
                });
            }

            entries.insert(seq, encoded.as_slice()).map_err(backend)?;
            hashes
                .insert(entry.hash.as_bytes().as_slice(), seq)
                .map_err(backend)?;

            let mut contiguous = meta
                .get(CONTIGUOUS_SIZE_KEY)
                .map_err(backend)?
                .map_or(0, |guard| guard.value());
            while entries.get(contiguous).map_err(backend)?.is_some() {
                contiguous += 1;
            }
            meta.insert(CONTIGUOUS_SIZE_KEY, contiguous).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;
        Ok(())
    }

    fn scan_from(&self, start: u64) -> StoreResult<EntryScan<'_>> {
        Ok(Box::new(RedbScan {
            store: self,
            next: start,
            buffer: VecDeque::new(),
            done: false,
        }))
    }

    fn tree_size(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let meta = read_txn.open_table(META_TABLE).map_err(backend)?;
        let size = meta
            .get(CONTIGUOUS_SIZE_KEY)
            .map_err(backend)?
            .map_or(0, |guard| guard.value());
        Ok(size)
    }

    fn lookup_by_sequence(&self, sequence_number: u64) -> StoreResult<Option<LoggedEntry>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
        match table.get(sequence_number).map_err(backend)? {
            Some(data) => Ok(Some(decode_entry(data.value())?)),
            None => Ok(None),
        }
    }

    fn lookup_by_hash(&self, hash: &Hash) -> StoreResult<Option<LoggedEntry>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let hashes = read_txn.open_table(HASH_INDEX_TABLE).map_err(backend)?;
        let entries = read_txn.open_table(ENTRIES_TABLE).map_err(backend)?;

        let Some(seq) = hashes
            .get(hash.as_bytes().as_slice())
            .map_err(backend)?
            .map(|guard| guard.value())
        else {
            return Ok(None);
        };
        match entries.get(seq).map_err(backend)? {
            Some(data) => Ok(Some(decode_entry(data.value())?)),
            None => Ok(None),
        }
    }
}

/// Lazy scan that pulls consecutive records in batches, one read transaction per batch
struct RedbScan<'a> {
    store: &'a RedbEntryStore,
    next: u64,
    buffer: VecDeque<LoggedEntry>,
    done: bool,
}

impl Iterator for RedbScan<'_> {
    type Item = StoreResult<LoggedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.store.read_batch(self.next, self.store.scan_batch_size) {
                Ok(batch) => {
                    if batch.len() < self.store.scan_batch_size {
                        self.done = true;
                    }
                    self.next += batch.len() as u64;
                    self.buffer.extend(batch);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verity_core::Timestamp;

    fn sequenced(seq: u64) -> LoggedEntry {
        LoggedEntry::from_leaf(format!("entry-{seq}").into_bytes(), Timestamp::from_millis(seq))
            .with_sequence_number(seq)
    }

    fn open(dir: &TempDir, batch: usize) -> RedbEntryStore {
        RedbEntryStore::open_path(dir.path().join("entries.redb"), batch).unwrap()
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 16);
        let entry = sequenced(0);
        store.create_sequenced_entry(&entry).unwrap();

        assert_eq!(store.lookup_by_sequence(0).unwrap(), Some(entry.clone()));
        assert_eq!(store.lookup_by_hash(&entry.hash).unwrap(), Some(entry));
        assert_eq!(store.lookup_by_hash(&Hash::zero()).unwrap(), None);
        assert_eq!(store.tree_size().unwrap(), 1);
    }

    #[test]
    fn test_collisions() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 16);
        let entry = sequenced(0);
        store.create_sequenced_entry(&entry).unwrap();

        let other = LoggedEntry::from_leaf(b"other".to_vec(), Timestamp::EPOCH).with_sequence_number(0);
        assert_eq!(
            store.create_sequenced_entry(&other),
            Err(StoreError::SequenceNumberAlreadyInUse(0))
        );
        assert!(matches!(
            store.create_sequenced_entry(&entry.with_sequence_number(5)),
            Err(StoreError::EntryAlreadyLogged { existing: 0, .. })
        ));
        // Failed writes leave nothing behind
        assert_eq!(store.lookup_by_sequence(5).unwrap(), None);
    }

    #[test]
    fn test_tree_size_with_gap() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 16);
        for seq in [0, 1, 3] {
            store.create_sequenced_entry(&sequenced(seq)).unwrap();
        }
        assert_eq!(store.tree_size().unwrap(), 2);
        store.create_sequenced_entry(&sequenced(2)).unwrap();
        assert_eq!(store.tree_size().unwrap(), 4);
    }

    #[test]
    fn test_scan_across_batches_stops_at_gap() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, 2);
        for seq in (0..7).chain(8..10) {
            store.create_sequenced_entry(&sequenced(seq)).unwrap();
        }
        let seqs: Vec<u64> = store
            .scan_from(1)
            .unwrap()
            .map(|r| r.unwrap().sequence_number.unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir, 16);
            store.create_sequenced_entry(&sequenced(0)).unwrap();
            store.create_sequenced_entry(&sequenced(1)).unwrap();
        }
        let store = open(&dir, 16);
        assert_eq!(store.tree_size().unwrap(), 2);
        assert_eq!(store.scan_from(0).unwrap().count(), 2);
    }
}
