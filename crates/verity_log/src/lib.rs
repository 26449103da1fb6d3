//! VERITY Log
//!
//! Log entries, the pending-entry ordering, canonical encoding, the
//! append-only RFC 6962 merkle tree and signed tree heads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod entry;
pub mod merkle;
pub mod tree_head;

pub use encoding::{CanonicalDecode, CanonicalEncode, DecodeError, EncodeError};
pub use entry::{pending_entries_order, LeafError, LoggedEntry};
pub use merkle::{CompactMerkleTree, leaf_hash, node_hash, root_from_leaves};
pub use tree_head::{DigitallySigned, SignatureAlgorithm, SignedTreeHead, TreeHeadVersion};
