//! In-memory consistency store.
//!
//! One [`MemoryConsistentStore`] holds the shared cluster state; further nodes
//! attach to the same state with [`MemoryConsistentStore::join`]. Every
//! handle sees the same pending set, mapping and serving tree head, and
//! answers [`ConsistentStore::get_cluster_node_state`] for its own node.

use crate::consistent_store::{
    ClusterNodeState, ConsistentStore, SequenceMapping, Versioned,
};
use crate::error::ConsistentStoreError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use verity_core::{Hash, NodeId};
use verity_log::{LoggedEntry, SignedTreeHead};

#[derive(Debug, Default)]
struct ClusterState {
    /// Arrival order
    pending: Vec<LoggedEntry>,
    pending_hashes: HashSet<Hash>,
    mapping: Versioned<SequenceMapping>,
    serving_sth: Option<SignedTreeHead>,
    node_states: HashMap<NodeId, ClusterNodeState>,
    unavailable: bool,
}

impl ClusterState {
    fn check_available(&self) -> Result<(), ConsistentStoreError> {
        if self.unavailable {
            return Err(ConsistentStoreError::Unavailable(
                "store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn serving_tree_size(&self) -> u64 {
        self.serving_sth.as_ref().map_or(0, |sth| sth.tree_size)
    }
}

/// Consistency store held in process memory, shared between node handles
#[derive(Debug, Clone)]
pub struct MemoryConsistentStore {
    node_id: NodeId,
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryConsistentStore {
    /// Create a fresh cluster and a handle for `node_id`
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: Arc::new(Mutex::new(ClusterState::default())),
        }
    }

    /// A handle onto the same cluster for another node
    #[must_use]
    pub fn join(&self, node_id: NodeId) -> Self {
        Self {
            node_id,
            state: Arc::clone(&self.state),
        }
    }

    /// Node this handle answers for
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Submit an entry for sequencing.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if an entry with the same hash is pending
    pub fn add_pending_entry(&self, entry: LoggedEntry) -> Result<(), ConsistentStoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        if state.pending_hashes.contains(&entry.hash) {
            return Err(ConsistentStoreError::AlreadyExists(format!(
                "pending entry {}",
                entry.hash
            )));
        }
        // Pending entries never carry a position.
        let mut entry = entry;
        entry.sequence_number = None;
        state.pending_hashes.insert(entry.hash);
        state.pending.push(entry);
        Ok(())
    }

    /// Number of pending entries
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Snapshot of the current mapping
    #[must_use]
    pub fn sequence_mapping(&self) -> Versioned<SequenceMapping> {
        self.state.lock().mapping.clone()
    }

    /// Choose the tree head the cluster serves
    pub fn set_serving_sth(&self, sth: SignedTreeHead) {
        debug!(tree_size = sth.tree_size, "serving tree head updated");
        self.state.lock().serving_sth = Some(sth);
    }

    /// Publish this node's state
    pub fn set_cluster_node_state(&self, node_state: ClusterNodeState) {
        self.state.lock().node_states.insert(self.node_id, node_state);
    }

    /// Publish `sth` as the newest tree head this node has signed
    pub fn publish_newest_sth(&self, sth: SignedTreeHead) {
        self.set_cluster_node_state(ClusterNodeState::new(self.node_id).with_newest_sth(sth));
    }

    /// Simulate an outage; every store operation fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Retire pending entries the serving tree head already covers.
    ///
    /// Once retired, their mappings vanish from the sequencer's view and are
    /// dropped on its next run. Returns the number of entries removed.
    pub fn purge_committed_pending(&self) -> usize {
        let mut state = self.state.lock();
        let serving = state.serving_tree_size();
        let committed: HashSet<Hash> = state
            .mapping
            .value
            .mappings
            .iter()
            .filter(|m| m.sequence_number < serving)
            .map(|m| m.entry_hash)
            .collect();
        let before = state.pending.len();
        state.pending.retain(|e| !committed.contains(&e.hash));
        state.pending_hashes.retain(|h| !committed.contains(h));
        let purged = before - state.pending.len();
        if purged > 0 {
            debug!(purged, serving_tree_size = serving, "purged committed pending entries");
        }
        purged
    }
}

impl ConsistentStore for MemoryConsistentStore {
    fn next_available_sequence_number(&self) -> Result<i64, ConsistentStoreError> {
        let state = self.state.lock();
        state.check_available()?;
        let next = match state.mapping.value.highest() {
            Some(highest) => highest.saturating_add(1),
            None => state.serving_tree_size(),
        };
        i64::try_from(next)
            .map_err(|_| ConsistentStoreError::Unavailable("sequence numbers exhausted".to_string()))
    }

    fn get_sequence_mapping(&self) -> Result<Versioned<SequenceMapping>, ConsistentStoreError> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.mapping.clone())
    }

    fn update_sequence_mapping(
        &self,
        mapping: &Versioned<SequenceMapping>,
    ) -> Result<(), ConsistentStoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        if state.mapping.version != mapping.version {
            return Err(ConsistentStoreError::VersionConflict {
                expected: mapping.version,
                actual: state.mapping.version,
            });
        }
        state.mapping = Versioned::new(mapping.version + 1, mapping.value.clone());
        Ok(())
    }

    fn get_pending_entries(&self) -> Result<Vec<LoggedEntry>, ConsistentStoreError> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.pending.clone())
    }

    fn get_serving_sth(&self) -> Result<SignedTreeHead, ConsistentStoreError> {
        let state = self.state.lock();
        state.check_available()?;
        state
            .serving_sth
            .clone()
            .ok_or_else(|| ConsistentStoreError::NotFound("serving tree head".to_string()))
    }

    fn get_cluster_node_state(&self) -> Result<ClusterNodeState, ConsistentStoreError> {
        let state = self.state.lock();
        state.check_available()?;
        state
            .node_states
            .get(&self.node_id)
            .cloned()
            .ok_or_else(|| {
                ConsistentStoreError::NotFound(format!("cluster node state for {}", self.node_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistent_store::Mapping;
    use verity_core::Timestamp;

    fn store() -> MemoryConsistentStore {
        MemoryConsistentStore::new(NodeId::from_name("node-a"))
    }

    fn entry(payload: &str) -> LoggedEntry {
        LoggedEntry::from_leaf(payload.as_bytes().to_vec(), Timestamp::from_millis(1))
    }

    fn mapped(entry: &LoggedEntry, seq: u64) -> Mapping {
        Mapping {
            entry_hash: entry.hash,
            sequence_number: seq,
        }
    }

    #[test]
    fn test_next_sequence_number_sources() {
        let store = store();
        assert_eq!(store.next_available_sequence_number().unwrap(), 0);

        store.set_serving_sth(SignedTreeHead::new(4, Timestamp::EPOCH, Hash::zero()));
        assert_eq!(store.next_available_sequence_number().unwrap(), 4);

        let e = entry("x");
        let mapping = Versioned::new(0, SequenceMapping::new(vec![mapped(&e, 9)]));
        store.update_sequence_mapping(&mapping).unwrap();
        assert_eq!(store.next_available_sequence_number().unwrap(), 10);
    }

    #[test]
    fn test_mapping_compare_and_swap() {
        let store = store();
        let read = store.get_sequence_mapping().unwrap();
        assert_eq!(read.version, 0);

        store.update_sequence_mapping(&read).unwrap();
        assert_eq!(store.get_sequence_mapping().unwrap().version, 1);

        // A second writer holding the stale version loses.
        assert_eq!(
            store.update_sequence_mapping(&read),
            Err(ConsistentStoreError::VersionConflict {
                expected: 0,
                actual: 1
            })
        );
    }

    #[test]
    fn test_duplicate_pending_rejected() {
        let store = store();
        store.add_pending_entry(entry("x")).unwrap();
        assert!(matches!(
            store.add_pending_entry(entry("x")),
            Err(ConsistentStoreError::AlreadyExists(_))
        ));
        assert_eq!(store.pending_len(), 1);
    }

    #[test]
    fn test_pending_entries_stripped_of_sequence_numbers() {
        let store = store();
        store.add_pending_entry(entry("x").with_sequence_number(3)).unwrap();
        let pending = store.get_pending_entries().unwrap();
        assert!(!pending[0].is_sequenced());
    }

    #[test]
    fn test_serving_sth_not_found() {
        assert!(matches!(
            store().get_serving_sth(),
            Err(ConsistentStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_node_state_is_per_node() {
        let a = store();
        let b = a.join(NodeId::from_name("node-b"));
        let sth = SignedTreeHead::new(1, Timestamp::from_millis(5), Hash::zero());
        a.publish_newest_sth(sth.clone());

        assert_eq!(a.get_cluster_node_state().unwrap().newest_sth, Some(sth));
        assert!(matches!(
            b.get_cluster_node_state(),
            Err(ConsistentStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_joined_handles_share_state() {
        let a = store();
        let b = a.join(NodeId::from_name("node-b"));
        a.add_pending_entry(entry("x")).unwrap();
        assert_eq!(b.get_pending_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_unavailable() {
        let store = store();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_pending_entries(),
            Err(ConsistentStoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.get_pending_entries().is_ok());
    }

    #[test]
    fn test_purge_committed_pending() {
        let store = store();
        let (x, y) = (entry("x"), entry("y"));
        store.add_pending_entry(x.clone()).unwrap();
        store.add_pending_entry(y.clone()).unwrap();
        let mapping = Versioned::new(0, SequenceMapping::new(vec![mapped(&x, 0), mapped(&y, 1)]));
        store.update_sequence_mapping(&mapping).unwrap();

        assert_eq!(store.purge_committed_pending(), 0);
        store.set_serving_sth(SignedTreeHead::new(1, Timestamp::EPOCH, Hash::zero()));
        assert_eq!(store.purge_committed_pending(), 1);

        let pending = store.get_pending_entries().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].hash, y.hash);
    }
}
