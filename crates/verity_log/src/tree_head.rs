//! Signed tree heads.

use serde::{Deserialize, Serialize};
use verity_core::{Hash, Timestamp};

/// Signature type byte for tree-head signatures
const SIGNATURE_TYPE_TREE_HASH: u8 = 1;

/// Tree head format version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeHeadVersion {
    /// Version 1
    #[default]
    V1,
}

impl TreeHeadVersion {
    /// Wire byte for this version
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::V1 => 0,
        }
    }
}

/// Signature algorithm used for a tree head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519
    Ed25519,
}

/// A signature together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitallySigned {
    /// Signature algorithm
    pub algorithm: SignatureAlgorithm,
    /// Signature bytes
    pub signature: Vec<u8>,
}

/// A timestamped, signed attestation of the tree's size and root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    /// Format version
    pub version: TreeHeadVersion,
    /// Number of leaves covered
    pub tree_size: u64,
    /// Production time
    pub timestamp: Timestamp,
    /// Merkle root at `tree_size`
    pub root_hash: Hash,
    /// Signature over [`SignedTreeHead::signing_input`], absent until signed
    pub signature: Option<DigitallySigned>,
}

impl SignedTreeHead {
    /// Create an unsigned tree head
    #[must_use]
    pub fn new(tree_size: u64, timestamp: Timestamp, root_hash: Hash) -> Self {
        Self {
            version: TreeHeadVersion::V1,
            tree_size,
            timestamp,
            root_hash,
            signature: None,
        }
    }

    /// Set the format version
    #[must_use]
    pub fn with_version(mut self, version: TreeHeadVersion) -> Self {
        self.version = version;
        self
    }

    /// Whether a signature has been attached
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Bytes covered by the signature.
    ///
    /// `version(1) | signature_type(1) | timestamp(u64 BE) | tree_size(u64 BE) | root(32)`
    #[must_use]
    pub fn signing_input(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + 8 + 8 + Hash::LEN);
        buf.push(self.version.as_byte());
        buf.push(SIGNATURE_TYPE_TREE_HASH);
        buf.extend_from_slice(&self.timestamp.as_millis().to_be_bytes());
        buf.extend_from_slice(&self.tree_size.to_be_bytes());
        buf.extend_from_slice(self.root_hash.as_bytes());
        buf
    }

    /// Render as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is not a tree head
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
