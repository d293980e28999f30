//! Transaction pool.
//!
//! The pool holds transactions from submission until they are pruned:
//! - Admission checks and a hard size ceiling
//! - Duplicate detection
//! - Priority batches (kind priority, then creation time)
//! - Retention of confirmed transactions
//!
//! Every mutation rewrites the `transaction_pool` collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use tally_core::{Block, Error, Result, Transaction, TxId, TxKind, TxStatus};
use tally_storage::{keys, KvStore, KvStoreExt};

/// Configuration for the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard ceiling on pooled transactions, whatever their status.
    pub max_size: usize,
    /// Transactions released per batch.
    pub batch_size: usize,
    /// Age after which confirmed transactions are pruned.
    pub retention_hours: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            batch_size: 10,
            retention_hours: 24,
        }
    }
}

/// Pool statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Count per kind, every kind present.
    pub by_kind: BTreeMap<TxKind, usize>,
    /// Mean gas used over confirmed transactions (0 if none).
    pub average_gas_used: f64,
}

/// Persisted pool of transactions.
pub struct TransactionPool<S: KvStore> {
    store: Arc<S>,
    config: PoolConfig,
    /// Insertion order.
    transactions: Vec<Transaction>,
    /// Position in `transactions` by id.
    index: HashMap<TxId, usize>,
}

impl<S: KvStore> TransactionPool<S> {
    /// Open the pool, loading any persisted transactions.
    pub fn open(store: Arc<S>, config: PoolConfig) -> Result<Self> {
        let transactions: Vec<Transaction> = store
            .load(keys::TRANSACTION_POOL)?
            .unwrap_or_default();
        debug!(count = transactions.len(), "Loaded transaction pool");

        let mut pool = Self {
            store,
            config,
            transactions,
            index: HashMap::new(),
        };
        pool.rebuild_index();
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Create a signed, pending transaction. It is not enqueued.
    pub fn create_transaction(
        &self,
        kind: TxKind,
        from: impl Into<String>,
        data: Value,
        to: Option<String>,
    ) -> Transaction {
        Transaction::new(kind, from, data, to)
    }

    /// Admission checks: id, signature, sender and payload present.
    ///
    /// The kind is a closed enum, so an unknown type tag fails earlier, when
    /// the transaction is parsed.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<()> {
        tx.validate()
    }

    /// Recompute the signature digest and compare it with the stored one.
    pub fn verify_signature(&self, tx: &Transaction) -> bool {
        tx.verify_signature()
    }

    /// Validate and enqueue a transaction.
    pub fn submit(&mut self, tx: Transaction) -> Result<TxId> {
        self.validate_transaction(&tx)?;

        if self.is_full() {
            return Err(Error::pool_full(self.config.max_size));
        }
        if self.contains(&tx.id) {
            return Err(Error::duplicate(format!("transaction {}", tx.id)));
        }

        let id = tx.id.clone();
        self.index.insert(id.clone(), self.transactions.len());
        self.transactions.push(tx);

        if let Err(e) = self.persist() {
            self.transactions.pop();
            self.index.remove(&id);
            return Err(e);
        }

        debug!(id = %id, pool_size = self.len(), "Transaction admitted");
        Ok(id)
    }

    /// Up to `batch_size` pending transactions, by kind priority then
    /// creation time. The pool is not modified.
    pub fn batch_for_processing(&self) -> Vec<Transaction> {
        let mut pending: Vec<&Transaction> =
            self.transactions.iter().filter(|tx| tx.is_pending()).collect();
        pending.sort_by_key(|tx| (tx.kind.priority(), tx.timestamp));
        pending
            .into_iter()
            .take(self.config.batch_size)
            .cloned()
            .collect()
    }

    /// Mark a pending transaction confirmed. Unknown or final ids are a no-op.
    pub fn mark_confirmed(&mut self, id: &TxId, block_index: u64, gas_used: u64) -> Result<bool> {
        let changed = match self.get_mut(id) {
            Some(tx) => tx.confirm(block_index, gas_used),
            None => false,
        };
        if changed {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Mark a pending transaction failed. Unknown or final ids are a no-op.
    pub fn mark_failed(&mut self, id: &TxId) -> Result<bool> {
        let changed = match self.get_mut(id) {
            Some(tx) => tx.fail(),
            None => false,
        };
        if changed {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Confirm every transaction of `block` that is still pending here, each
    /// charged its full gas limit. One write for the whole block.
    pub fn confirm_block(&mut self, block: &Block) -> Result<usize> {
        let mut confirmed = 0;
        for included in &block.transactions {
            if let Some(tx) = self.get_mut(&included.id) {
                let gas = tx.gas_limit;
                if tx.confirm(block.index, gas) {
                    confirmed += 1;
                }
            }
        }
        if confirmed > 0 {
            self.persist()?;
        }
        Ok(confirmed)
    }

    /// Remove confirmed transactions created before `older_than`
    /// (default: now minus the retention window). Pending and failed
    /// transactions are kept.
    pub fn clear_confirmed(&mut self, older_than: Option<DateTime<Utc>>) -> Result<usize> {
        let cutoff = older_than
            .unwrap_or_else(|| Utc::now() - Duration::hours(self.config.retention_hours));

        let before = self.transactions.len();
        let previous = self.transactions.clone();
        self.transactions
            .retain(|tx| !(tx.status == TxStatus::Confirmed && tx.timestamp < cutoff));
        let removed = before - self.transactions.len();

        if removed > 0 {
            if let Err(e) = self.persist() {
                self.transactions = previous;
                return Err(e);
            }
            self.rebuild_index();
            info!(removed, remaining = self.len(), "Pruned confirmed transactions");
        }
        Ok(removed)
    }

    /// Counts by status and kind, and mean gas used over confirmed.
    pub fn stats(&self) -> PoolStats {
        let mut by_kind: BTreeMap<TxKind, usize> =
            TxKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        let (mut pending, mut confirmed, mut failed) = (0, 0, 0);
        let mut confirmed_gas: u64 = 0;

        for tx in &self.transactions {
            *by_kind.entry(tx.kind).or_default() += 1;
            match tx.status {
                TxStatus::Pending => pending += 1,
                TxStatus::Confirmed => {
                    confirmed += 1;
                    confirmed_gas += tx.gas_used;
                }
                TxStatus::Failed => failed += 1,
            }
        }

        let average_gas_used = if confirmed == 0 {
            0.0
        } else {
            confirmed_gas as f64 / confirmed as f64
        };

        PoolStats {
            total: self.transactions.len(),
            pending,
            confirmed,
            failed,
            by_kind,
            average_gas_used,
        }
    }

    pub fn get(&self, id: &TxId) -> Option<&Transaction> {
        self.index.get(id).map(|&i| &self.transactions[i])
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.index.contains_key(id)
    }

    /// All pooled transactions in insertion order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Check if the pool has reached its ceiling.
    pub fn is_full(&self) -> bool {
        self.transactions.len() >= self.config.max_size
    }

    pub fn pending_count(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.is_pending()).count()
    }

    fn get_mut(&mut self, id: &TxId) -> Option<&mut Transaction> {
        let i = *self.index.get(id)?;
        self.transactions.get_mut(i)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.id.clone(), i))
            .collect();
    }

    fn persist(&self) -> Result<()> {
        self.store.save(keys::TRANSACTION_POOL, &self.transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::{BlockBuilder, Hash};
    use tally_storage::MemoryStore;

    fn pool() -> TransactionPool<MemoryStore> {
        TransactionPool::open(Arc::new(MemoryStore::new()), PoolConfig::default()).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn tx_at(kind: TxKind, ms: i64) -> Transaction {
        Transaction::with_timestamp(kind, "sender", json!({ "n": ms }), None, at(ms))
    }

    #[test]
    fn test_create_transaction_not_enqueued() {
        let pool = pool();
        let tx = pool.create_transaction(TxKind::ElectionCreate, "admin", json!({}), None);
        assert_eq!(tx.gas_limit, 500);
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_submit_and_get() {
        let mut pool = pool();
        let tx = tx_at(TxKind::Vote, 0);
        let id = pool.submit(tx.clone()).unwrap();
        assert_eq!(pool.get(&id), Some(&tx));
        assert_eq!(pool.pending_count(), 1);
    }

    #[test]
    fn test_submit_rejects_invalid() {
        let mut pool = pool();

        let mut tx = tx_at(TxKind::Vote, 0);
        tx.from = String::new();
        assert!(matches!(pool.submit(tx), Err(Error::InvalidTransaction { .. })));

        let mut tx = tx_at(TxKind::Vote, 0);
        tx.data = Value::Null;
        assert!(pool.submit(tx).is_err());

        let mut tx = tx_at(TxKind::Vote, 0);
        tx.signature = Hash::ZERO;
        assert!(pool.submit(tx).is_err());

        assert!(pool.is_empty());
    }

    #[test]
    fn test_submit_rejects_duplicate() {
        let mut pool = pool();
        let tx = tx_at(TxKind::Vote, 0);
        pool.submit(tx.clone()).unwrap();
        assert!(matches!(pool.submit(tx), Err(Error::Duplicate { .. })));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_capacity_ceiling() {
        let mut pool = pool();
        for i in 0..1000 {
            pool.submit(tx_at(TxKind::Vote, i)).unwrap();
        }
        let err = pool.submit(tx_at(TxKind::Vote, 1000)).unwrap_err();
        assert!(matches!(err, Error::PoolFull { capacity: 1000, .. }));
        assert_eq!(pool.len(), 1000);
    }

    #[test]
    fn test_capacity_counts_final_transactions() {
        let store = Arc::new(MemoryStore::new());
        let config = PoolConfig {
            max_size: 2,
            ..PoolConfig::default()
        };
        let mut pool = TransactionPool::open(store, config).unwrap();
        let id = pool.submit(tx_at(TxKind::Vote, 0)).unwrap();
        pool.mark_failed(&id).unwrap();
        pool.submit(tx_at(TxKind::Vote, 1)).unwrap();
        assert!(pool.submit(tx_at(TxKind::Vote, 2)).is_err());
    }

    #[test]
    fn test_batch_order() {
        let mut pool = pool();
        let register = tx_at(TxKind::VoterRegister, 0);
        let vote_late = tx_at(TxKind::Vote, 20);
        let create = tx_at(TxKind::ElectionCreate, 5);
        let vote_early = tx_at(TxKind::Vote, 10);
        let contract = tx_at(TxKind::SmartContract, 1);
        for tx in [&register, &vote_late, &create, &vote_early, &contract] {
            pool.submit(tx.clone()).unwrap();
        }

        let ids: Vec<TxId> = pool
            .batch_for_processing()
            .into_iter()
            .map(|tx| tx.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                vote_early.id,
                vote_late.id,
                contract.id,
                create.id,
                register.id
            ]
        );
    }

    #[test]
    fn test_batch_limit_and_pending_only() {
        let mut pool = pool();
        let mut ids = Vec::new();
        for i in 0..15 {
            ids.push(pool.submit(tx_at(TxKind::Vote, i)).unwrap());
        }
        pool.mark_failed(&ids[0]).unwrap();
        pool.mark_confirmed(&ids[1], 1, 100).unwrap();

        let batch = pool.batch_for_processing();
        assert_eq!(batch.len(), 10);
        assert!(batch.iter().all(|tx| tx.is_pending()));
        assert_eq!(batch[0].id, ids[2]);
        // Not removed.
        assert_eq!(pool.len(), 15);
    }

    #[test]
    fn test_status_transitions_one_way() {
        let mut pool = pool();
        let id = pool.submit(tx_at(TxKind::Vote, 0)).unwrap();

        assert!(pool.mark_confirmed(&id, 3, 100).unwrap());
        assert!(!pool.mark_failed(&id).unwrap());
        assert!(!pool.mark_confirmed(&id, 4, 50).unwrap());

        let tx = pool.get(&id).unwrap();
        assert_eq!(tx.status, TxStatus::Confirmed);
        assert_eq!(tx.block_index, Some(3));
        assert_eq!(tx.gas_used, 100);
    }

    #[test]
    fn test_mark_unknown_is_noop() {
        let mut pool = pool();
        let unknown = TxId::from("missing");
        assert!(!pool.mark_confirmed(&unknown, 1, 1).unwrap());
        assert!(!pool.mark_failed(&unknown).unwrap());
    }

    #[test]
    fn test_confirm_block() {
        let mut pool = pool();
        let a = tx_at(TxKind::Vote, 0);
        let b = tx_at(TxKind::SmartContract, 1);
        pool.submit(a.clone()).unwrap();
        pool.submit(b.clone()).unwrap();

        let genesis = Block::genesis(at(0));
        let block = BlockBuilder::new("validator-1")
            .parent(&genesis)
            .transactions(vec![a.clone(), b.clone()])
            .seal();

        assert_eq!(pool.confirm_block(&block).unwrap(), 2);
        assert_eq!(pool.get(&a.id).unwrap().gas_used, 100);
        assert_eq!(pool.get(&b.id).unwrap().gas_used, 1000);
        assert_eq!(pool.get(&b.id).unwrap().block_index, Some(1));
        assert_eq!(pool.confirm_block(&block).unwrap(), 0);
    }

    #[test]
    fn test_clear_confirmed() {
        let mut pool = pool();
        let old_confirmed = pool.submit(tx_at(TxKind::Vote, 0)).unwrap();
        let old_failed = pool.submit(tx_at(TxKind::Vote, 1)).unwrap();
        let old_pending = pool.submit(tx_at(TxKind::Vote, 2)).unwrap();
        let new_confirmed = pool.submit(tx_at(TxKind::Vote, 10_000)).unwrap();

        pool.mark_confirmed(&old_confirmed, 1, 100).unwrap();
        pool.mark_failed(&old_failed).unwrap();
        pool.mark_confirmed(&new_confirmed, 1, 100).unwrap();

        assert_eq!(pool.clear_confirmed(Some(at(5_000))).unwrap(), 1);
        assert!(pool.get(&old_confirmed).is_none());
        assert!(pool.get(&old_failed).is_some());
        assert!(pool.get(&old_pending).is_some());
        assert!(pool.get(&new_confirmed).is_some());
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_clear_confirmed_default_retention() {
        let mut pool = pool();
        let tx = pool.create_transaction(TxKind::Vote, "v", json!({}), None);
        let recent = pool.submit(tx).unwrap();
        pool.mark_confirmed(&recent, 1, 100).unwrap();
        assert_eq!(pool.clear_confirmed(None).unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let mut pool = pool();
        assert_eq!(pool.stats().average_gas_used, 0.0);

        let a = pool.submit(tx_at(TxKind::Vote, 0)).unwrap();
        let b = pool.submit(tx_at(TxKind::ElectionCreate, 1)).unwrap();
        let c = pool.submit(tx_at(TxKind::Vote, 2)).unwrap();
        pool.submit(tx_at(TxKind::Vote, 3)).unwrap();
        pool.mark_confirmed(&a, 1, 100).unwrap();
        pool.mark_confirmed(&b, 1, 500).unwrap();
        pool.mark_failed(&c).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.confirmed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_kind[&TxKind::Vote], 3);
        assert_eq!(stats.by_kind[&TxKind::ElectionCreate], 1);
        assert_eq!(stats.by_kind[&TxKind::SmartContract], 0);
        assert_eq!(stats.average_gas_used, 300.0);
    }

    #[test]
    fn test_verify_signature_detects_tampering() {
        let pool = pool();
        let mut tx = tx_at(TxKind::Vote, 0);
        assert!(pool.verify_signature(&tx));
        tx.data = json!({ "candidate": "other" });
        assert!(!pool.verify_signature(&tx));
    }

    #[test]
    fn test_reopen_restores_pool() {
        let store = Arc::new(MemoryStore::new());
        let id = {
            let mut pool = TransactionPool::open(store.clone(), PoolConfig::default()).unwrap();
            let id = pool.submit(tx_at(TxKind::Vote, 0)).unwrap();
            pool.mark_confirmed(&id, 2, 100).unwrap();
            id
        };

        let pool = TransactionPool::open(store, PoolConfig::default()).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(&id).unwrap().block_index, Some(2));
    }
}
