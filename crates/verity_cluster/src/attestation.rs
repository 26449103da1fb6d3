//! Producing signed tree heads.

use crate::error::FatalInconsistency;
use tracing::debug;
use verity_certify::TreeHeadSigner;
use verity_core::Timestamp;
use verity_log::{CompactMerkleTree, SignedTreeHead, TreeHeadVersion};

/// Sign the tree at its current size.
///
/// The timestamp is `now`, raised to `min_timestamp` when the clock lags, so
/// that tree heads never go backwards in time and never predate an entry they
/// cover.
///
/// # Errors
///
/// Fatal if the signer fails.
pub fn timestamp_and_sign<K: TreeHeadSigner + ?Sized>(
    tree: &CompactMerkleTree,
    signer: &K,
    version: TreeHeadVersion,
    now: Timestamp,
    min_timestamp: Timestamp,
) -> Result<SignedTreeHead, FatalInconsistency> {
    if now < min_timestamp {
        debug!(
            %now,
            %min_timestamp,
            lag_ms = min_timestamp.millis_since(now),
            "clock behind newest covered timestamp, clamping"
        );
    }
    let timestamp = now.max(min_timestamp);
    let mut sth = SignedTreeHead::new(tree.leaf_count(), timestamp, tree.current_root())
        .with_version(version);
    signer.sign_tree_head(&mut sth)?;
    Ok(sth)
}
