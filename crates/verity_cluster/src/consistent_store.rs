//! Cluster-wide coordination store contract.
//!
//! The consistency store is shared by every log node. It holds the pending
//! entry set, the authoritative hash -> sequence number mapping, the tree head
//! the cluster currently serves, and each node's last published state. The
//! mapping is versioned so that concurrent sequencers detect lost races with a
//! compare-and-swap instead of a lock.

use crate::error::ConsistentStoreError;
use serde::{Deserialize, Serialize};
use verity_core::{Hash, NodeId};
use verity_log::{LoggedEntry, SignedTreeHead};

/// A record together with the version it was read at.
///
/// Version 0 means the record has never been written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Version observed on read
    pub version: u64,
    /// The record
    pub value: T,
}

impl<T> Versioned<T> {
    /// Wrap a value at a version
    #[must_use]
    pub const fn new(version: u64, value: T) -> Self {
        Self { version, value }
    }
}

/// One hash -> sequence number assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Content hash of the entry
    pub entry_hash: Hash,
    /// Permanent position in the log
    pub sequence_number: u64,
}

/// The authoritative set of assignments for entries not yet retired
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMapping {
    /// Assignments, in ascending sequence order once written by a sequencer
    pub mappings: Vec<Mapping>,
}

impl SequenceMapping {
    /// Build from assignments
    #[must_use]
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self { mappings }
    }

    /// Number of assignments
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether nothing is mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Sequence number mapped to `hash`, if any
    #[must_use]
    pub fn sequence_number_of(&self, hash: &Hash) -> Option<u64> {
        self.mappings
            .iter()
            .find(|m| m.entry_hash == *hash)
            .map(|m| m.sequence_number)
    }

    /// Highest mapped sequence number
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        self.mappings.iter().map(|m| m.sequence_number).max()
    }
}

/// What a node last published about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeState {
    /// Publishing node
    pub node_id: NodeId,
    /// Newest tree head the node has signed
    pub newest_sth: Option<SignedTreeHead>,
}

impl ClusterNodeState {
    /// State for a node that has not signed anything yet
    #[must_use]
    pub const fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            newest_sth: None,
        }
    }

    /// Attach the newest signed tree head
    #[must_use]
    pub fn with_newest_sth(mut self, sth: SignedTreeHead) -> Self {
        self.newest_sth = Some(sth);
        self
    }
}

/// Coordination store as seen from one node.
///
/// Every operation may fail with [`ConsistentStoreError::Unavailable`].
pub trait ConsistentStore: Send + Sync {
    /// Next unused sequence number.
    ///
    /// Signed so that a misbehaving store can be detected.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    fn next_available_sequence_number(&self) -> Result<i64, ConsistentStoreError>;

    /// Current mapping and its version.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    fn get_sequence_mapping(&self) -> Result<Versioned<SequenceMapping>, ConsistentStoreError>;

    /// Replace the mapping if its version still matches `mapping.version`.
    ///
    /// # Errors
    ///
    /// `VersionConflict` if another writer got there first
    fn update_sequence_mapping(
        &self,
        mapping: &Versioned<SequenceMapping>,
    ) -> Result<(), ConsistentStoreError>;

    /// Entries submitted and not yet retired, without sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    fn get_pending_entries(&self) -> Result<Vec<LoggedEntry>, ConsistentStoreError>;

    /// Tree head the cluster currently serves.
    ///
    /// # Errors
    ///
    /// `NotFound` if none has been chosen yet
    fn get_serving_sth(&self) -> Result<SignedTreeHead, ConsistentStoreError>;

    /// This node's last published state.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node has never published
    fn get_cluster_node_state(&self) -> Result<ClusterNodeState, ConsistentStoreError>;
}

impl<C: ConsistentStore + ?Sized> ConsistentStore for std::sync::Arc<C> {
    fn next_available_sequence_number(&self) -> Result<i64, ConsistentStoreError> {
        (**self).next_available_sequence_number()
    }

    fn get_sequence_mapping(&self) -> Result<Versioned<SequenceMapping>, ConsistentStoreError> {
        (**self).get_sequence_mapping()
    }

    fn update_sequence_mapping(
        &self,
        mapping: &Versioned<SequenceMapping>,
    ) -> Result<(), ConsistentStoreError> {
        (**self).update_sequence_mapping(mapping)
    }

    fn get_pending_entries(&self) -> Result<Vec<LoggedEntry>, ConsistentStoreError> {
        (**self).get_pending_entries()
    }

    fn get_serving_sth(&self) -> Result<SignedTreeHead, ConsistentStoreError> {
        (**self).get_serving_sth()
    }

    fn get_cluster_node_state(&self) -> Result<ClusterNodeState, ConsistentStoreError> {
        (**self).get_cluster_node_state()
    }
}
