//! Signer configuration.

use serde::{Deserialize, Serialize};
use verity_core::NodeId;
use verity_log::TreeHeadVersion;

/// Tree signer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Identity under which this node publishes its state
    pub node_id: NodeId,
    /// Minimum age in milliseconds before a new entry is given a sequence number
    pub guard_window_ms: u64,
    /// Format version of produced tree heads
    pub tree_head_version: TreeHeadVersion,
}

impl SignerConfig {
    /// Create a config for a node
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    /// Set the guard window
    #[must_use]
    pub const fn with_guard_window_ms(mut self, guard_window_ms: u64) -> Self {
        self.guard_window_ms = guard_window_ms;
        self
    }

    /// Set the tree head version
    #[must_use]
    pub const fn with_tree_head_version(mut self, version: TreeHeadVersion) -> Self {
        self.tree_head_version = version;
        self
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(),
            guard_window_ms: 0,
            tree_head_version: TreeHeadVersion::V1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_config_default() {
        let config = SignerConfig::default();
        assert_eq!(config.guard_window_ms, 0);
        assert_eq!(config.tree_head_version, TreeHeadVersion::V1);
    }

    #[test]
    fn test_signer_config_builder() {
        let node = NodeId::from_name("log-1");
        let config = SignerConfig::new(node).with_guard_window_ms(60_000);
        assert_eq!(config.node_id, node);
        assert_eq!(config.guard_window_ms, 60_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SignerConfig = serde_json::from_str(r#"{"guard_window_ms": 250}"#).unwrap();
        assert_eq!(config.guard_window_ms, 250);
        assert_eq!(config.tree_head_version, TreeHeadVersion::V1);
    }
}
