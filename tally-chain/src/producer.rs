//! Block producer for turning pooled transactions into blocks.
//!
//! The block producer:
//! - Pulls priority batches from the pool
//! - Screens them through an optional [`TransactionCheck`]
//! - Appends a block under the current authority
//! - Confirms included transactions in the pool

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use tally_core::{Block, Result, Transaction, TxId, TxStatus};
use tally_storage::KvStore;

use crate::ledger::Ledger;
use crate::pool::TransactionPool;

/// Configuration for the block producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Interval between batch processing attempts.
    pub block_interval: Duration,
    /// Prune old confirmed transactions on every tick.
    pub prune_on_tick: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_millis(tally_core::DEFAULT_BLOCK_TIME_MS),
            prune_on_tick: true,
        }
    }
}

/// Outcome of screening one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Reject(String),
}

/// Screens batched transactions before they are sealed into a block.
pub trait TransactionCheck: Send + Sync {
    fn check(&self, tx: &Transaction) -> Verdict;
}

/// Where a transaction stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxVerification {
    NotFound,
    Pending,
    Failed,
    Confirmed {
        block_index: u64,
        /// Chain length minus the including block's index.
        confirmations: u64,
    },
}

/// Block producer that owns the ledger and the pool.
pub struct BlockProducer<S: KvStore> {
    ledger: Ledger<S>,
    pool: TransactionPool<S>,
    config: ProducerConfig,
    check: Option<Box<dyn TransactionCheck>>,
}

impl<S: KvStore + 'static> BlockProducer<S> {
    /// Create a new block producer.
    pub fn new(ledger: Ledger<S>, pool: TransactionPool<S>, config: ProducerConfig) -> Self {
        Self {
            ledger,
            pool,
            config,
            check: None,
        }
    }

    /// Screen every batch through `check` before it reaches the ledger.
    pub fn with_check(mut self, check: impl TransactionCheck + 'static) -> Self {
        self.check = Some(Box::new(check));
        self
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger<S> {
        &mut self.ledger
    }

    pub fn pool(&self) -> &TransactionPool<S> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TransactionPool<S> {
        &mut self.pool
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Add a transaction to the pool.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<TxId> {
        self.pool.submit(tx)
    }

    /// Append a block holding `transactions` and confirm them in the pool,
    /// each charged its gas limit.
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let block = self.ledger.append(transactions)?;
        if let Err(e) = self.pool.confirm_block(&block) {
            warn!(index = block.index, error = %e, "Failed to confirm pooled transactions");
        }
        Ok(block)
    }

    /// Pull one batch from the pool and seal it into a block.
    ///
    /// Returns `None` when nothing is pending or every batched transaction
    /// was rejected by the check.
    pub fn process_transaction_batch(&mut self) -> Result<Option<Block>> {
        let batch = self.pool.batch_for_processing();
        if batch.is_empty() {
            debug!("No pending transactions, skipping block");
            return Ok(None);
        }

        let admitted = match &self.check {
            None => batch,
            Some(check) => {
                let mut admitted = Vec::with_capacity(batch.len());
                let mut rejected = Vec::new();
                for tx in batch {
                    match check.check(&tx) {
                        Verdict::Admit => admitted.push(tx),
                        Verdict::Reject(reason) => rejected.push((tx.id, reason)),
                    }
                }
                for (id, reason) in rejected {
                    warn!(id = %id, reason = %reason, "Transaction rejected");
                    self.pool.mark_failed(&id)?;
                }
                admitted
            }
        };

        if admitted.is_empty() {
            return Ok(None);
        }
        self.add_block(admitted).map(Some)
    }

    /// Look a transaction up in the pool, then in the chain.
    pub fn verify_transaction(&self, id: &TxId) -> TxVerification {
        let chain_len = self.ledger.len() as u64;
        let confirmed = |block_index: u64| TxVerification::Confirmed {
            block_index,
            confirmations: chain_len.saturating_sub(block_index),
        };

        if let Some(tx) = self.pool.get(id) {
            return match (tx.status, tx.block_index) {
                (TxStatus::Pending, _) => TxVerification::Pending,
                (TxStatus::Failed, _) => TxVerification::Failed,
                (TxStatus::Confirmed, Some(index)) => confirmed(index),
                (TxStatus::Confirmed, None) => TxVerification::Pending,
            };
        }

        // Pruned from the pool but still on chain.
        self.ledger
            .chain()
            .iter()
            .find(|b| b.transactions.iter().any(|tx| &tx.id == id))
            .map(|b| confirmed(b.index))
            .unwrap_or(TxVerification::NotFound)
    }

    /// Drop confirmed transactions older than the pool's retention window.
    pub fn prune_confirmed(&mut self) -> Result<usize> {
        self.pool.clear_confirmed(None)
    }

    /// Run the producer loop until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(producer: Arc<RwLock<Self>>, mut shutdown: watch::Receiver<bool>) {
        let (period, prune) = {
            let p = producer.read();
            (p.config.block_interval, p.config.prune_on_tick)
        };
        let mut ticker = interval(period);
        info!(interval_ms = period.as_millis() as u64, "Block producer started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Block producer shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    producer.write().tick(prune);
                }
            }
        }
    }

    fn tick(&mut self, prune: bool) {
        if prune {
            match self.prune_confirmed() {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, "Pruned confirmed transactions"),
                Err(e) => warn!("Failed to prune pool: {}", e),
            }
        }
        match self.process_transaction_batch() {
            Ok(Some(block)) => debug!(index = block.index, "Produced block"),
            Ok(None) => {}
            Err(e) => warn!("Failed to produce block: {}", e),
        }
    }
}
