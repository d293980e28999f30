//! Chain operations for the Tally election ledger.
//!
//! This crate provides chain management without networking:
//! - Ledger state (genesis, append, integrity walk, node table)
//! - Validator rotation (PoA round-robin)
//! - Transaction pool (admission, priority batches, retention)
//! - Block producer (timer-based batch processing)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BlockProducer                        │
//! │  (Timer-based batches from the pool, optional screen)   │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  TransactionPool                        │
//! │  (Admission, dedup, capacity, priority batches)         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Ledger                            │
//! │  (Chain, node table, consensus state, append/validate)  │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   ValidatorSet                          │
//! │  (Active validators, round-robin succession)            │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod ledger;
mod pool;
mod producer;
mod validators;

#[cfg(test)]
mod proptest;

pub use ledger::{ChainConfig, InitReport, Ledger, NetworkHealth, NetworkStatus};
pub use pool::{PoolConfig, PoolStats, TransactionPool};
pub use producer::{BlockProducer, ProducerConfig, TransactionCheck, TxVerification, Verdict};
pub use validators::{RotationPolicy, ValidatorSet};
