//! Append-only merkle tree over the log's leaves.
//!
//! Hashing follows RFC 6962: leaves are hashed as `SHA-256(0x00 || leaf)`,
//! interior nodes as `SHA-256(0x01 || left || right)`, and the empty tree's
//! root is `SHA-256("")`. Only the roots of the perfect subtrees making up the
//! current tree are retained, so memory is O(log n).

use verity_core::Hash;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash a serialized leaf
#[must_use]
pub fn leaf_hash(leaf: &[u8]) -> Hash {
    Hash::compute_parts(&[&[LEAF_PREFIX], leaf])
}

/// Hash two child nodes into their parent
#[must_use]
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    Hash::compute_parts(&[&[NODE_PREFIX], left.as_bytes(), right.as_bytes()])
}

/// Merkle tree hash of a full leaf list, straight from the RFC 6962 definition.
///
/// O(n) and allocation-heavy; the incremental tree is the production path.
#[must_use]
pub fn root_from_leaves<L: AsRef<[u8]>>(leaves: &[L]) -> Hash {
    match leaves.len() {
        0 => Hash::compute(b""),
        1 => leaf_hash(leaves[0].as_ref()),
        n => {
            // Largest power of two strictly less than n
            let k = 1usize << (usize::BITS - 1 - (n - 1).leading_zeros());
            node_hash(&root_from_leaves(&leaves[..k]), &root_from_leaves(&leaves[k..]))
        }
    }
}

/// Compact incremental merkle tree.
///
/// `frontier[level]` holds the root of a perfect subtree of `2^level` leaves
/// exactly when bit `level` of the leaf count is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactMerkleTree {
    leaf_count: u64,
    frontier: Vec<Option<Hash>>,
    root: Hash,
}

impl CompactMerkleTree {
    /// Create an empty tree
    #[must_use]
    pub fn new() -> Self {
        Self {
            leaf_count: 0,
            frontier: Vec::new(),
            root: Hash::compute(b""),
        }
    }

    /// Number of leaves appended so far, which is also the next sequence number to append
    #[must_use]
    pub const fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Root hash at the current leaf count
    #[must_use]
    pub const fn current_root(&self) -> Hash {
        self.root
    }

    /// Whether no leaves have been appended
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Append a serialized leaf, returning the new leaf count
    pub fn add_leaf(&mut self, leaf: &[u8]) -> u64 {
        self.add_leaf_hash(leaf_hash(leaf))
    }

    /// Append an already-hashed leaf, returning the new leaf count
    pub fn add_leaf_hash(&mut self, hash: Hash) -> u64 {
        let mut carry = hash;
        let mut level = 0usize;
        // Merge with every complete subtree of the same height, like binary increment.
        while self.leaf_count & (1u64 << level) != 0 {
            if let Some(left) = self.frontier[level].take() {
                carry = node_hash(&left, &carry);
            }
            level += 1;
        }
        if level == self.frontier.len() {
            self.frontier.push(None);
        }
        self.frontier[level] = Some(carry);
        self.leaf_count += 1;
        self.root = self.compute_root();
        self.leaf_count
    }

    fn compute_root(&self) -> Hash {
        // Lower levels sit to the right of higher ones.
        let mut acc: Option<Hash> = None;
        for subtree in self.frontier.iter().flatten() {
            acc = Some(match acc {
                None => *subtree,
                Some(right) => node_hash(subtree, &right),
            });
        }
        acc.unwrap_or_else(|| Hash::compute(b""))
    }
}

impl Default for CompactMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("leaf-{i}").into_bytes()).collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = CompactMerkleTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(
            tree.current_root().to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_leaf() {
        let mut tree = CompactMerkleTree::new();
        assert_eq!(tree.add_leaf(b"a"), 1);
        assert_eq!(tree.current_root(), leaf_hash(b"a"));
    }

    #[test]
    fn test_empty_leaf_hash_vector() {
        // RFC 6962 leaf hash of the empty string
        assert_eq!(
            leaf_hash(b"").to_hex(),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn test_three_leaves_shape() {
        let mut tree = CompactMerkleTree::new();
        for leaf in [b"a", b"b", b"c"] {
            tree.add_leaf(leaf);
        }
        let expected = node_hash(
            &node_hash(&leaf_hash(b"a"), &leaf_hash(b"b")),
            &leaf_hash(b"c"),
        );
        assert_eq!(tree.current_root(), expected);
    }

    #[test]
    fn test_matches_reference_up_to_33() {
        let all = leaves(33);
        let mut tree = CompactMerkleTree::new();
        for (i, leaf) in all.iter().enumerate() {
            tree.add_leaf(leaf);
            assert_eq!(tree.current_root(), root_from_leaves(&all[..=i]), "size {}", i + 1);
        }
    }

    #[test]
    fn test_leaf_and_node_domains_differ() {
        let a = leaf_hash(b"a");
        let b = leaf_hash(b"b");
        let mut joined = Vec::new();
        joined.extend_from_slice(a.as_bytes());
        joined.extend_from_slice(b.as_bytes());
        assert_ne!(node_hash(&a, &b), leaf_hash(&joined));
    }

    proptest! {
        #[test]
        fn prop_compact_matches_reference(payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..16), 0..70)) {
            let mut tree = CompactMerkleTree::new();
            for p in &payloads {
                tree.add_leaf(p);
            }
            prop_assert_eq!(tree.leaf_count(), payloads.len() as u64);
            prop_assert_eq!(tree.current_root(), root_from_leaves(&payloads));
        }
    }
}
