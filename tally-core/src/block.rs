//! Block types for Tally.
//!
//! Blocks batch transactions together and link by hash to form the chain.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::{hash, hash_all, Hash};
use crate::error::{Error, Result};
use crate::merkle::transactions_root;
use crate::transaction::Transaction;

/// Identity that seals the genesis block.
pub const SYSTEM_VALIDATOR: &str = "system";

/// A block in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (0 = genesis).
    pub index: u64,

    /// Creation time, millisecond precision.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Opaque payload.
    pub data: Value,

    /// Hash of the previous block (zero for genesis).
    pub previous_hash: Hash,

    /// Hash of this block's content.
    pub hash: Hash,

    /// Proof-of-work nonce (0 under PoA).
    pub nonce: u64,

    /// Validator that produced the block.
    pub validator: String,

    /// Validator seal over index, hash and validator id.
    pub signature: Hash,

    /// Included transactions, in commitment order.
    pub transactions: Vec<Transaction>,

    /// Merkle root over `transactions`.
    pub merkle_root: Hash,

    /// Sum of transaction gas.
    pub gas_used: u64,

    /// Difficulty in effect when produced.
    pub difficulty: u32,
}

/// Helper for hashing (excludes hash and signature).
#[derive(Serialize)]
struct SignableBlock<'a> {
    index: u64,
    timestamp: i64,
    data: String,
    previous_hash: &'a Hash,
    nonce: u64,
    validator: &'a str,
    merkle_root: &'a Hash,
    gas_used: u64,
    difficulty: u32,
}

impl Block {
    /// Build the genesis block.
    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        BlockBuilder::new(SYSTEM_VALIDATOR)
            .timestamp(timestamp)
            .data(json!({ "genesis": true, "message": "Genesis Block" }))
            .seal()
    }

    /// Compute the content hash.
    pub fn compute_hash(&self) -> Hash {
        let signable = SignableBlock {
            index: self.index,
            timestamp: self.timestamp.timestamp_millis(),
            data: self.data.to_string(),
            previous_hash: &self.previous_hash,
            nonce: self.nonce,
            validator: &self.validator,
            merkle_root: &self.merkle_root,
            gas_used: self.gas_used,
            difficulty: self.difficulty,
        };
        hash(&bincode::serialize(&signable).expect("serialization should not fail"))
    }

    /// Compute the validator seal for the current hash.
    pub fn compute_signature(&self) -> Hash {
        hash_all(&[
            self.index.to_string().as_bytes(),
            self.hash.to_hex().as_bytes(),
            self.validator.as_bytes(),
        ])
    }

    /// Check that the block is internally consistent: stored hash, merkle
    /// root and seal all match what its content produces.
    pub fn verify_integrity(&self) -> Result<()> {
        if self.hash != self.compute_hash() {
            return Err(Error::invalid_block(self.index, "hash mismatch"));
        }

        if self.merkle_root != transactions_root(&self.transactions) {
            return Err(Error::invalid_block(self.index, "merkle root mismatch"));
        }

        if self.signature != self.compute_signature() {
            return Err(Error::invalid_block(self.index, "invalid validator signature"));
        }

        Ok(())
    }

    /// Validate this block against its parent (or as genesis when `None`).
    pub fn validate(&self, parent: Option<&Block>) -> Result<()> {
        match parent {
            Some(p) => {
                if self.index != p.index + 1 {
                    return Err(Error::invalid_block(
                        self.index,
                        format!("index {} should be {}", self.index, p.index + 1),
                    ));
                }

                if self.previous_hash != p.hash {
                    return Err(Error::invalid_block(self.index, "previous hash mismatch"));
                }
            }
            None => {
                if self.index != 0 {
                    return Err(Error::invalid_block(self.index, "genesis must have index 0"));
                }
                if !self.previous_hash.is_zero() {
                    return Err(Error::invalid_block(0, "genesis must have zero previous hash"));
                }
            }
        }

        self.verify_integrity()
    }

    /// Check whether the hash satisfies a proof-of-work difficulty.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.hash.leading_zero_digits() >= difficulty
    }
}

/// Builder for creating blocks.
pub struct BlockBuilder {
    parent: Option<(u64, Hash)>,
    transactions: Vec<Transaction>,
    validator: String,
    data: Value,
    difficulty: u32,
    timestamp: Option<DateTime<Utc>>,
}

impl BlockBuilder {
    /// Create a new block builder.
    pub fn new(validator: impl Into<String>) -> Self {
        Self {
            parent: None,
            transactions: Vec::new(),
            validator: validator.into(),
            data: Value::Null,
            difficulty: 0,
            timestamp: None,
        }
    }

    /// Set the parent block.
    pub fn parent(mut self, parent: &Block) -> Self {
        self.parent = Some((parent.index, parent.hash));
        self
    }

    /// Set the transactions.
    pub fn transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Set the payload.
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Set the difficulty recorded in the block.
    pub fn difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Set the creation time (defaults to now).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn assemble(self) -> Block {
        let (index, previous_hash) = match self.parent {
            Some((index, hash)) => (index + 1, hash),
            None => (0, Hash::ZERO),
        };

        let merkle_root = transactions_root(&self.transactions);
        let gas_used = self.transactions.iter().map(|tx| tx.gas_limit).sum();

        Block {
            index,
            timestamp: self.timestamp.unwrap_or_else(crate::now),
            data: self.data,
            previous_hash,
            hash: Hash::ZERO,
            nonce: 0,
            validator: self.validator,
            signature: Hash::ZERO,
            transactions: self.transactions,
            merkle_root,
            gas_used,
            difficulty: self.difficulty,
        }
    }

    /// Build and seal the block without a nonce search (PoA).
    pub fn seal(self) -> Block {
        let mut block = self.assemble();
        block.hash = block.compute_hash();
        block.signature = block.compute_signature();
        block
    }

    /// Build the block, searching random nonces until the hash meets the
    /// recorded difficulty, then seal it (PoW).
    ///
    /// Gives up with [`Error::PowTimeout`] after `max_iterations` attempts.
    pub fn mine(self, max_iterations: u64) -> Result<Block> {
        let mut block = self.assemble();
        let difficulty = block.difficulty;
        let mut rng = rand::thread_rng();

        for _ in 0..max_iterations {
            block.nonce = rng.gen();
            block.hash = block.compute_hash();
            if block.meets_difficulty(difficulty) {
                block.signature = block.compute_signature();
                return Ok(block);
            }
        }

        Err(Error::pow_timeout(max_iterations, difficulty))
    }
}
