//! Tally Core - Fundamental types for the Tally election ledger.
//!
//! This crate provides the data structures and digest primitives used
//! throughout the Tally workspace:
//!
//! - [`crypto`] - SHA-256 digests rendered as hex
//! - [`transaction`] - Election actions awaiting or holding a place in the chain
//! - [`block`] - Hash-linked blocks that batch transactions
//! - [`merkle`] - Order-sensitive merkle commitments
//! - [`node`] / [`consensus`] - Validator records and the authority pointer
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tally_core::{Block, BlockBuilder, Transaction, TxKind};
//!
//! let genesis = Block::genesis(tally_core::now());
//! let vote = Transaction::new(TxKind::Vote, "voter-7", json!({ "candidate": "c1" }), None);
//!
//! let block = BlockBuilder::new("validator-1")
//!     .parent(&genesis)
//!     .transactions(vec![vote])
//!     .seal();
//!
//! assert!(block.validate(Some(&genesis)).is_ok());
//! ```

pub mod block;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod node;
pub mod transaction;

#[cfg(test)]
mod proptest;

use chrono::{DateTime, SubsecRound, Utc};

// Re-exports for convenience
pub use block::{Block, BlockBuilder, SYSTEM_VALIDATOR};
pub use consensus::{ConsensusState, Mechanism, DEFAULT_BLOCK_TIME_MS, DEFAULT_DIFFICULTY};
pub use crypto::{hash, hash_all, hash_pair, Hash};
pub use error::{Error, ErrorCode, Result};
pub use merkle::{merkle_root, transactions_root};
pub use node::{default_nodes, Node, NodeKind, NodeStatus};
pub use transaction::{Transaction, TxId, TxKind, TxStatus};

/// Current time truncated to the millisecond precision that is persisted.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
