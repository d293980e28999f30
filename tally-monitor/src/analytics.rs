//! Read-only views over ledger and pool state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_chain::{Ledger, NetworkStatus, PoolStats, TransactionPool};
use tally_core::{Hash, NodeKind, NodeStatus, TxKind};
use tally_storage::KvStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorPerformance {
    pub id: String,
    pub status: NodeStatus,
    pub blocks_validated: u64,
    /// Blocks in the chain carrying this validator's id.
    pub blocks_in_chain: usize,
    /// Share of non-genesis blocks, 0–100.
    pub share: f64,
    pub reputation: u8,
    pub is_current: bool,
}

/// Per-validator production figures, in node-table order.
pub fn validator_performance<S: KvStore>(ledger: &Ledger<S>) -> Vec<ValidatorPerformance> {
    let produced = ledger.chain().len().saturating_sub(1);
    let current = &ledger.consensus().current_validator;

    ledger
        .nodes()
        .iter()
        .filter(|n| n.is_validator())
        .map(|n| {
            let blocks_in_chain = ledger
                .chain()
                .iter()
                .skip(1)
                .filter(|b| b.validator == n.id)
                .count();
            let share = if produced == 0 {
                0.0
            } else {
                blocks_in_chain as f64 * 100.0 / produced as f64
            };
            ValidatorPerformance {
                id: n.id.clone(),
                status: n.status,
                blocks_validated: n.blocks_validated,
                blocks_in_chain,
                share,
                reputation: n.reputation,
                is_current: &n.id == current,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalytics {
    pub pool: PoolStats,
    /// Transactions sealed into blocks.
    pub on_chain: usize,
    pub on_chain_by_kind: BTreeMap<TxKind, usize>,
    /// Gas committed in blocks.
    pub total_gas_used: u64,
}

/// Pool statistics plus what made it on chain.
pub fn transaction_analytics<S: KvStore>(
    ledger: &Ledger<S>,
    pool: &TransactionPool<S>,
) -> TransactionAnalytics {
    let blocks = ledger.chain().get(1..).unwrap_or_default();
    let mut on_chain_by_kind: BTreeMap<TxKind, usize> =
        TxKind::ALL.iter().map(|k| (*k, 0)).collect();
    for tx in blocks.iter().flat_map(|b| &b.transactions) {
        *on_chain_by_kind.entry(tx.kind).or_default() += 1;
    }

    TransactionAnalytics {
        pool: pool.stats(),
        on_chain: blocks.iter().map(|b| b.transactions.len()).sum(),
        on_chain_by_kind,
        total_gas_used: blocks.iter().map(|b| b.gas_used).sum(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub address: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub reputation: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub nodes: Vec<NodeSummary>,
    pub by_kind: BTreeMap<String, usize>,
    pub status: NetworkStatus,
}

/// Node table with counts per role.
pub fn network_topology<S: KvStore>(ledger: &Ledger<S>) -> NetworkTopology {
    let mut by_kind = BTreeMap::new();
    let nodes = ledger
        .nodes()
        .iter()
        .map(|n| {
            let kind = match n.kind {
                NodeKind::Validator => "validator",
                NodeKind::Peer => "peer",
                NodeKind::Light => "light",
            };
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
            NodeSummary {
                id: n.id.clone(),
                address: n.address.clone(),
                kind: n.kind,
                status: n.status,
                reputation: n.reputation,
            }
        })
        .collect();

    NetworkTopology {
        nodes,
        by_kind,
        status: ledger.network_status(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStatistics {
    pub index: u64,
    pub hash: Hash,
    pub validator: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub transactions: usize,
    pub by_kind: BTreeMap<TxKind, usize>,
    pub gas_used: u64,
    /// Gap to the previous block; `None` for genesis.
    pub block_time_ms: Option<i64>,
    pub confirmations: u64,
}

/// Details of the block at `index`.
pub fn block_statistics<S: KvStore>(ledger: &Ledger<S>, index: u64) -> Option<BlockStatistics> {
    let block = ledger.block_by_index(index)?;
    let previous = index.checked_sub(1).and_then(|i| ledger.block_by_index(i));

    let mut by_kind = BTreeMap::new();
    for tx in &block.transactions {
        *by_kind.entry(tx.kind).or_insert(0) += 1;
    }

    Some(BlockStatistics {
        index: block.index,
        hash: block.hash,
        validator: block.validator.clone(),
        timestamp: block.timestamp,
        transactions: block.transactions.len(),
        by_kind,
        gas_used: block.gas_used,
        block_time_ms: previous.map(|p| (block.timestamp - p.timestamp).num_milliseconds()),
        confirmations: (ledger.len() as u64).saturating_sub(block.index),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tally_chain::{ChainConfig, PoolConfig};
    use tally_core::Transaction;
    use tally_storage::MemoryStore;

    fn ledger_with_blocks(sizes: &[usize]) -> Ledger<MemoryStore> {
        let mut ledger =
            Ledger::open(Arc::new(MemoryStore::new()), ChainConfig::default()).unwrap();
        for &n in sizes {
            let txs = (0..n)
                .map(|i| {
                    let kind = if i % 2 == 0 { TxKind::Vote } else { TxKind::VoterRegister };
                    Transaction::new(kind, format!("u{i}"), json!({}), None)
                })
                .collect();
            ledger.append(txs).unwrap();
        }
        ledger
    }

    #[test]
    fn test_validator_performance() {
        let ledger = ledger_with_blocks(&[1, 1, 1, 1]);
        let perf = validator_performance(&ledger);
        assert_eq!(perf.len(), 3);
        assert_eq!(perf[0].id, "validator-1");
        assert_eq!(perf[0].blocks_in_chain, 2);
        assert_eq!(perf[0].blocks_validated, 2);
        assert_eq!(perf[0].share, 50.0);
        assert_eq!(perf[2].blocks_in_chain, 1);
        assert!(perf[1].is_current);
    }

    #[test]
    fn test_transaction_analytics() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = Ledger::open(store.clone(), ChainConfig::default()).unwrap();
        let pool = TransactionPool::open(store, PoolConfig::default()).unwrap();
        for n in [2, 5, 5, 0] {
            let txs = (0..n)
                .map(|i| Transaction::new(TxKind::Vote, format!("u{i}"), json!({}), None))
                .collect();
            ledger.append(txs).unwrap();
        }

        let analytics = transaction_analytics(&ledger, &pool);
        assert_eq!(analytics.on_chain, 12);
        assert_eq!(analytics.on_chain_by_kind[&TxKind::Vote], 12);
        assert_eq!(analytics.total_gas_used, 1200);
        assert_eq!(analytics.pool.total, 0);

        let empty = transaction_analytics(&ledger_with_blocks(&[]), &pool);
        assert_eq!(empty.on_chain, 0);
        assert_eq!(empty.on_chain_by_kind.len(), TxKind::ALL.len());
        assert_eq!(empty.total_gas_used, 0);
    }

    #[test]
    fn test_network_topology() {
        let ledger = ledger_with_blocks(&[]);
        let topology = network_topology(&ledger);
        assert_eq!(topology.nodes.len(), 6);
        assert_eq!(topology.by_kind["validator"], 3);
        assert_eq!(topology.by_kind["peer"], 3);
        assert_eq!(topology.status.total_nodes, 6);
    }

    #[test]
    fn test_block_statistics() {
        let ledger = ledger_with_blocks(&[3, 0]);
        let stats = block_statistics(&ledger, 1).unwrap();
        assert_eq!(stats.transactions, 3);
        assert_eq!(stats.by_kind[&TxKind::Vote], 2);
        assert_eq!(stats.by_kind[&TxKind::VoterRegister], 1);
        assert_eq!(stats.gas_used, 400);
        assert_eq!(stats.confirmations, 2);
        assert!(stats.block_time_ms.unwrap() >= 0);

        let genesis = block_statistics(&ledger, 0).unwrap();
        assert_eq!(genesis.block_time_ms, None);
        assert_eq!(genesis.validator, "system");

        assert!(block_statistics(&ledger, 5).is_none());
    }
}
