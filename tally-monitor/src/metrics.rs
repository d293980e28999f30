//! Realtime metrics derived from ledger, pool and contract state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_chain::{Ledger, NetworkHealth, TransactionPool};
use tally_core::Block;
use tally_rules::ContractMetrics;
use tally_storage::KvStore;

use crate::monitor::MonitorConfig;

/// Blocks sampled for block time and hash rate.
pub const BLOCK_WINDOW: usize = 100;

/// Blocks sampled for throughput.
pub const TPS_WINDOW: usize = 10;

/// One metrics sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMetrics {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub block_height: u64,
    pub total_transactions: usize,
    pub pending_transactions: usize,
    pub average_block_time_ms: f64,
    pub transactions_per_second: f64,
    pub hash_rate: f64,
    pub active_nodes: usize,
    pub active_validators: usize,
    pub chain_valid: bool,
    pub network_health: NetworkHealth,
    pub consensus_health: NetworkHealth,
    pub active_contracts: usize,
    pub contract_executions: u64,
}

fn window(chain: &[Block], size: usize) -> &[Block] {
    &chain[chain.len().saturating_sub(size)..]
}

fn span_ms(blocks: &[Block]) -> i64 {
    match (blocks.first(), blocks.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
        _ => 0,
    }
}

/// Mean gap between consecutive blocks in the last `size` blocks.
pub fn average_block_time_ms(chain: &[Block], size: usize) -> f64 {
    let blocks = window(chain, size);
    if blocks.len() < 2 {
        return 0.0;
    }
    span_ms(blocks) as f64 / (blocks.len() - 1) as f64
}

/// Transactions in the last `size` blocks over the time they span.
pub fn transactions_per_second(chain: &[Block], size: usize) -> f64 {
    let blocks = window(chain, size);
    let elapsed = span_ms(blocks);
    if blocks.len() < 2 || elapsed <= 0 {
        return 0.0;
    }
    let count: usize = blocks.iter().map(|b| b.transactions.len()).sum();
    count as f64 * 1000.0 / elapsed as f64
}

/// Estimated work per second: `2^(difficulty * 4)` per block over the last
/// `size` blocks, divided by their span.
pub fn hash_rate(chain: &[Block], size: usize) -> f64 {
    let blocks = window(chain, size);
    let elapsed = span_ms(blocks);
    if blocks.len() < 2 || elapsed <= 0 {
        return 0.0;
    }
    let work: f64 = blocks
        .iter()
        .map(|b| 2f64.powf(b.difficulty as f64 * 4.0))
        .sum();
    work * 1000.0 / elapsed as f64
}

/// Consensus health from chain validity, network health and block time.
pub fn consensus_health(
    chain_valid: bool,
    network: NetworkHealth,
    average_block_time_ms: f64,
    config: &MonitorConfig,
) -> NetworkHealth {
    if !chain_valid || network == NetworkHealth::Critical {
        NetworkHealth::Critical
    } else if network == NetworkHealth::Degraded
        || average_block_time_ms > config.block_time_warning_ms as f64
    {
        NetworkHealth::Degraded
    } else {
        NetworkHealth::Healthy
    }
}

/// Sample every metric at `now`.
pub fn realtime_metrics<S: KvStore>(
    ledger: &Ledger<S>,
    pool: &TransactionPool<S>,
    contracts: &ContractMetrics,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> RealtimeMetrics {
    let chain = ledger.chain();
    let status = ledger.network_status();
    let chain_valid = ledger.validate_chain();
    let average_block_time_ms = average_block_time_ms(chain, BLOCK_WINDOW);

    RealtimeMetrics {
        timestamp: now,
        block_height: chain.len() as u64,
        total_transactions: chain.iter().map(|b| b.transactions.len()).sum(),
        pending_transactions: pool.pending_count(),
        average_block_time_ms,
        transactions_per_second: transactions_per_second(chain, TPS_WINDOW),
        hash_rate: hash_rate(chain, BLOCK_WINDOW),
        active_nodes: status.active_nodes,
        active_validators: status.active_validators,
        chain_valid,
        network_health: status.health,
        consensus_health: consensus_health(
            chain_valid,
            status.health,
            average_block_time_ms,
            config,
        ),
        active_contracts: contracts.active,
        contract_executions: contracts.total_executions,
    }
}
