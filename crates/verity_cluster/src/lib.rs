//! VERITY Cluster
//!
//! The sequencing and signing engine run by every node of a replicated log.
//! Nodes agree on sequence numbers through a shared consistency store, record
//! sequenced entries in their local store, and periodically sign a tree head
//! over everything recorded so far.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attestation;
pub mod config;
pub mod consistent_store;
pub mod error;
pub mod memory;
pub mod sequencer;
pub mod tree_builder;
pub mod tree_signer;

pub use attestation::timestamp_and_sign;
pub use config::SignerConfig;
pub use consistent_store::{ClusterNodeState, ConsistentStore, Mapping, SequenceMapping, Versioned};
pub use error::{
    ConsistentStoreError, FatalInconsistency, RecoverableError, SignerError, SignerResult,
};
pub use memory::MemoryConsistentStore;
pub use sequencer::{Sequencer, SequencingReport};
pub use tree_builder::{append_to_tree, check_next_leaf, drain_into_tree, DrainOutcome};
pub use tree_signer::TreeSigner;
