//! The per-node signing engine.
//!
//! A [`TreeSigner`] owns one node's view of the log: its local record store,
//! its in-memory merkle tree and the newest tree head it signed. It is driven
//! by an external scheduler that alternates [`TreeSigner::sequence_new_entries`]
//! and [`TreeSigner::update_tree`]; both take `&mut self`, so a signer is never
//! driven concurrently with itself. Concurrency between nodes is resolved in
//! the consistency store.
//!
//! On startup the tree is empty and the first `update_tree` replays the whole
//! local store into it.

use crate::attestation::timestamp_and_sign;
use crate::config::SignerConfig;
use crate::consistent_store::ConsistentStore;
use crate::error::{
    ConsistentStoreError, FatalInconsistency, RecoverableError, SignerError, SignerResult,
};
use crate::sequencer::{Sequencer, SequencingReport};
use crate::tree_builder::{check_next_leaf, drain_into_tree};
use tracing::{debug, error, info, warn};
use verity_certify::TreeHeadSigner;
use verity_core::{Clock, Hash, SystemClock, Timestamp};
use verity_log::{CompactMerkleTree, LoggedEntry, SignedTreeHead};
use verity_storage::{EntryStore, StoreError};

/// Sequencing and tree-head signing for one log node
pub struct TreeSigner<C, E, K, T = SystemClock> {
    config: SignerConfig,
    sequencer: Sequencer,
    consistent_store: C,
    local_store: E,
    signer: K,
    clock: T,
    tree: CompactMerkleTree,
    latest_tree_head: Option<SignedTreeHead>,
}

impl<C, E, K, T> TreeSigner<C, E, K, T>
where
    C: ConsistentStore,
    E: EntryStore,
    K: TreeHeadSigner,
    T: Clock,
{
    /// Create a signer, restoring the newest tree head this node published.
    ///
    /// A node that has never published starts with no tree head.
    ///
    /// # Errors
    ///
    /// Fatal if the node's published state exists but cannot be read.
    pub fn new(
        config: SignerConfig,
        tree: CompactMerkleTree,
        consistent_store: C,
        local_store: E,
        signer: K,
        clock: T,
    ) -> SignerResult<Self> {
        let latest_tree_head = match consistent_store.get_cluster_node_state() {
            Ok(state) => state.newest_sth,
            Err(ConsistentStoreError::NotFound(_)) => {
                info!(node = %config.node_id, "no published node state, starting fresh");
                None
            }
            Err(err) => {
                error!(node = %config.node_id, error = %err, "cannot read published node state");
                return Err(FatalInconsistency::NodeStateUnreadable(err).into());
            }
        };
        if let Some(sth) = &latest_tree_head {
            info!(
                node = %config.node_id,
                tree_size = sth.tree_size,
                timestamp = %sth.timestamp,
                "restored newest tree head"
            );
        }

        Ok(Self {
            sequencer: Sequencer::new(config.guard_window_ms),
            config,
            consistent_store,
            local_store,
            signer,
            clock,
            tree,
            latest_tree_head,
        })
    }

    /// Assign sequence numbers to pending entries and record them locally.
    ///
    /// # Errors
    ///
    /// Recoverable errors may be retried on the next tick; fatal errors mean
    /// the process must stop.
    pub fn sequence_new_entries(&mut self) -> SignerResult<SequencingReport> {
        let now = self.clock.now();
        let result = self
            .sequencer
            .sequence_new_entries(&self.consistent_store, &self.local_store, now);
        match &result {
            Ok(report) => info!(
                node = %self.config.node_id,
                newly_sequenced = report.newly_sequenced,
                reused = report.reused,
                deferred = report.deferred,
                dropped = report.dropped,
                recorded_locally = report.recorded_locally,
                "sequencing run complete"
            ),
            Err(err) => self.log_failure("sequencing", err),
        }
        result
    }

    /// Extend the tree with newly recorded entries and sign a fresh tree head.
    ///
    /// # Errors
    ///
    /// Fatal if the local store and tree disagree, the store fails, or
    /// signing fails.
    pub fn update_tree(&mut self) -> SignerResult<SignedTreeHead> {
        let result = self.try_update_tree();
        if let Err(err) = &result {
            self.log_failure("tree update", err);
        }
        result
    }

    fn try_update_tree(&mut self) -> SignerResult<SignedTreeHead> {
        let mut min_timestamp = self.last_update_time().saturating_add(1);
        let drained = drain_into_tree(&self.local_store, &mut self.tree)?;
        if let Some(newest) = drained.max_timestamp {
            min_timestamp = min_timestamp.max(newest);
        }

        let sth = timestamp_and_sign(
            &self.tree,
            &self.signer,
            self.config.tree_head_version,
            self.clock.now(),
            min_timestamp,
        )?;
        info!(
            node = %self.config.node_id,
            appended = drained.appended,
            tree_size = sth.tree_size,
            root = %sth.root_hash.short(),
            timestamp = %sth.timestamp,
            "signed tree head"
        );
        self.latest_tree_head = Some(sth.clone());
        Ok(sth)
    }

    /// Record a single sequenced entry and add it to the tree.
    ///
    /// The entry must carry the next sequence number.
    ///
    /// # Errors
    ///
    /// `SequenceNumberInUse` (recoverable) if another writer already recorded
    /// that position; the tree is left untouched. Every other failure is fatal.
    pub fn append(&mut self, entry: &LoggedEntry) -> SignerResult<()> {
        let leaf = check_next_leaf(&self.tree, entry)?;
        match self.local_store.create_sequenced_entry(entry) {
            Ok(()) => {}
            Err(StoreError::SequenceNumberAlreadyInUse(seq)) => {
                error!(
                    node = %self.config.node_id,
                    sequence_number = seq,
                    hash = %entry.hash.short(),
                    "sequence number already in use"
                );
                return Err(RecoverableError::SequenceNumberInUse(seq).into());
            }
            Err(err) => return Err(FatalInconsistency::LocalStore(err).into()),
        }
        let leaf_count = self.tree.add_leaf(&leaf);
        debug!(leaf_count, hash = %entry.hash.short(), "appended entry");
        Ok(())
    }

    fn log_failure(&self, operation: &str, err: &SignerError) {
        match err {
            SignerError::Recoverable(e) => {
                warn!(node = %self.config.node_id, operation, error = %e, "recoverable failure");
            }
            SignerError::Fatal(e) => {
                error!(node = %self.config.node_id, operation, error = %e, "fatal inconsistency");
            }
        }
    }

    /// Timestamp of the newest signed tree head, or the epoch
    #[must_use]
    pub fn last_update_time(&self) -> Timestamp {
        self.latest_tree_head
            .as_ref()
            .map_or(Timestamp::EPOCH, |sth| sth.timestamp)
    }

    /// Newest tree head signed or restored by this node
    #[must_use]
    pub const fn latest_tree_head(&self) -> Option<&SignedTreeHead> {
        self.latest_tree_head.as_ref()
    }

    /// Leaves in the in-memory tree
    #[must_use]
    pub const fn leaf_count(&self) -> u64 {
        self.tree.leaf_count()
    }

    /// Root of the in-memory tree
    #[must_use]
    pub const fn current_root(&self) -> Hash {
        self.tree.current_root()
    }
}
