//! Network node records.
//!
//! Nodes are local bookkeeping entries, not live peers. Validators take turns
//! producing blocks; peers and light nodes only count toward network health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound of a node's reputation score.
pub const MAX_REPUTATION: u8 = 100;

/// Stake assigned to each seeded validator.
pub const DEFAULT_VALIDATOR_STAKE: u64 = 1_000_000;

/// Role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Validator,
    Peer,
    Light,
}

/// Liveness of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Inactive,
}

/// A node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub address: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub status: NodeStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
    pub blocks_validated: u64,
    pub reputation: u8,
    pub stake: u64,
}

impl Node {
    /// Create an active validator.
    pub fn validator(id: impl Into<String>, address: impl Into<String>, stake: u64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            kind: NodeKind::Validator,
            status: NodeStatus::Active,
            last_seen: crate::now(),
            blocks_validated: 0,
            reputation: MAX_REPUTATION,
            stake,
        }
    }

    /// Create an active peer.
    pub fn peer(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            kind: NodeKind::Peer,
            status: NodeStatus::Active,
            last_seen: crate::now(),
            blocks_validated: 0,
            reputation: 80,
            stake: 0,
        }
    }

    /// Check if the node is active.
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// Check if the node is a validator.
    pub fn is_validator(&self) -> bool {
        self.kind == NodeKind::Validator
    }

    /// Check if the node can currently produce blocks.
    pub fn is_active_validator(&self) -> bool {
        self.is_validator() && self.is_active()
    }

    /// Record a successfully validated block.
    pub fn record_validation(&mut self, at: DateTime<Utc>) {
        self.blocks_validated += 1;
        self.last_seen = at;
        self.reputation = self.reputation.saturating_add(1).min(MAX_REPUTATION);
    }
}

/// The fixed node set seeded on first initialization: three validators and
/// three peers.
pub fn default_nodes() -> Vec<Node> {
    vec![
        Node::validator("validator-1", "10.0.1.1:8545", DEFAULT_VALIDATOR_STAKE),
        Node::validator("validator-2", "10.0.1.2:8545", DEFAULT_VALIDATOR_STAKE),
        Node::validator("validator-3", "10.0.1.3:8545", DEFAULT_VALIDATOR_STAKE),
        Node::peer("peer-1", "10.0.2.1:8545"),
        Node::peer("peer-2", "10.0.2.2:8545"),
        Node::peer("peer-3", "10.0.2.3:8545"),
    ]
}
