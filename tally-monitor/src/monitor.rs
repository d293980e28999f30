//! Periodic sampling with a bounded, persisted history.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use tally_chain::BlockProducer;
use tally_core::Result;
use tally_rules::RuleEngine;
use tally_storage::{keys, KvStore, KvStoreExt};

use crate::analytics::{
    self, BlockStatistics, NetworkTopology, TransactionAnalytics, ValidatorPerformance,
};
use crate::health::{self, Anomaly, HealthReport};
use crate::metrics::{self, RealtimeMetrics};

/// Monitor thresholds and sampling parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Mean block time above which health degrades to warning.
    pub block_time_warning_ms: u64,
    /// Mean block time above which health is critical.
    pub block_time_critical_ms: u64,
    /// Pending backlog above which health degrades to warning.
    pub pending_warning: usize,
    /// Pending backlog above which health is critical.
    pub pending_critical: usize,
    /// Fewer active nodes than this is a warning.
    pub min_active_nodes: usize,
    /// Snapshots kept in history.
    pub max_history: usize,
    /// Seconds between collections.
    pub collect_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            block_time_warning_ms: 10_000,
            block_time_critical_ms: 30_000,
            pending_warning: 100,
            pending_critical: 500,
            min_active_nodes: 3,
            max_history: 1000,
            collect_interval_secs: 30,
        }
    }
}

impl MonitorConfig {
    /// Collection period.
    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }
}

/// Read-side observer of the producer and rule engine.
///
/// The rule engine lock is always taken and released before the producer
/// lock, never both at once.
pub struct Monitor<S: KvStore> {
    store: Arc<S>,
    producer: Arc<RwLock<BlockProducer<S>>>,
    rules: Arc<RwLock<RuleEngine<S>>>,
    config: MonitorConfig,
    history: RwLock<VecDeque<RealtimeMetrics>>,
}

impl<S: KvStore + 'static> Monitor<S> {
    /// Open the monitor, reloading persisted history.
    pub fn open(
        store: Arc<S>,
        producer: Arc<RwLock<BlockProducer<S>>>,
        rules: Arc<RwLock<RuleEngine<S>>>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let mut history: VecDeque<RealtimeMetrics> =
            store.load(keys::METRICS_HISTORY)?.unwrap_or_default();
        while history.len() > config.max_history {
            history.pop_front();
        }
        Ok(Self {
            store,
            producer,
            rules,
            config,
            history: RwLock::new(history),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Sample every metric now.
    pub fn realtime_metrics(&self) -> RealtimeMetrics {
        let contracts = self.rules.read().metrics();
        let producer = self.producer.read();
        metrics::realtime_metrics(
            producer.ledger(),
            producer.pool(),
            &contracts,
            &self.config,
            tally_core::now(),
        )
    }

    /// Classify current health.
    pub fn health(&self) -> HealthReport {
        health::assess(self.realtime_metrics(), &self.config)
    }

    /// Anomalies in the current state.
    pub fn detect_anomalies(&self) -> Vec<Anomaly> {
        health::detect(&self.realtime_metrics(), &self.config)
    }

    /// Append a snapshot to history and persist it.
    ///
    /// A failed write is logged; the snapshot stays in memory.
    pub fn collect_metrics(&self) -> RealtimeMetrics {
        let sample = self.realtime_metrics();

        let mut history = self.history.write();
        history.push_back(sample.clone());
        while history.len() > self.config.max_history {
            history.pop_front();
        }
        if let Err(e) = self.store.save(keys::METRICS_HISTORY, &*history) {
            warn!("Failed to persist metrics history: {}", e);
        }

        debug!(
            block_height = sample.block_height,
            pending = sample.pending_transactions,
            "Collected metrics"
        );
        sample
    }

    /// Up to `limit` snapshots, newest first.
    pub fn metrics_history(&self, limit: usize) -> Vec<RealtimeMetrics> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn validator_performance(&self) -> Vec<ValidatorPerformance> {
        analytics::validator_performance(self.producer.read().ledger())
    }

    pub fn transaction_analytics(&self) -> TransactionAnalytics {
        let producer = self.producer.read();
        analytics::transaction_analytics(producer.ledger(), producer.pool())
    }

    pub fn network_topology(&self) -> NetworkTopology {
        analytics::network_topology(self.producer.read().ledger())
    }

    pub fn block_statistics(&self, index: u64) -> Option<BlockStatistics> {
        analytics::block_statistics(self.producer.read().ledger(), index)
    }

    /// Collect on every tick until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.collect_interval();
        let mut ticker = interval(period);
        info!(interval_secs = period.as_secs(), "Metrics collector started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Metrics collector shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.collect_metrics();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tally_chain::{ChainConfig, Ledger, PoolConfig, ProducerConfig, TransactionPool};
    use tally_core::{Error, Transaction, TxKind};
    use tally_storage::MemoryStore;

    use crate::health::HealthStatus;

    /// Memory store that refuses writes to one key.
    #[derive(Default)]
    struct RefusingStore {
        inner: MemoryStore,
        refuse: Option<&'static str>,
    }

    impl KvStore for RefusingStore {
        fn get_value(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get_value(key)
        }

        fn set_value(&self, key: &str, value: Value) -> Result<()> {
            if self.refuse == Some(key) {
                return Err(Error::storage_write(format!("{key}: disk full")));
            }
            self.inner.set_value(key, value)
        }
    }

    fn monitor_on<S: KvStore + 'static>(store: Arc<S>, config: MonitorConfig) -> Monitor<S> {
        let ledger = Ledger::open(store.clone(), ChainConfig::default()).unwrap();
        let pool = TransactionPool::open(store.clone(), PoolConfig::default()).unwrap();
        let producer = BlockProducer::new(ledger, pool, ProducerConfig::default());
        let rules = RuleEngine::open(store.clone()).unwrap();
        Monitor::open(
            store,
            Arc::new(RwLock::new(producer)),
            Arc::new(RwLock::new(rules)),
            config,
        )
        .unwrap()
    }

    fn monitor() -> Monitor<MemoryStore> {
        monitor_on(Arc::new(MemoryStore::new()), MonitorConfig::default())
    }

    #[test]
    fn test_fresh_network_is_healthy() {
        let monitor = monitor();
        let m = monitor.realtime_metrics();
        assert_eq!(m.block_height, 1);
        assert!(m.chain_valid);
        assert_eq!(m.active_nodes, 6);
        assert_eq!(m.active_contracts, 3);

        let report = monitor.health();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(monitor.detect_anomalies().is_empty());
    }

    #[test]
    fn test_backlog_raises_warning() {
        let monitor = monitor();
        {
            let mut producer = monitor.producer.write();
            for i in 0..101 {
                let tx = Transaction::new(TxKind::Vote, format!("v{i}"), json!({}), None);
                producer.submit_transaction(tx).unwrap();
            }
        }
        let report = monitor.health();
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.metrics.pending_transactions, 101);
    }

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let config = MonitorConfig {
            max_history: 3,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new());
        let monitor = monitor_on(store.clone(), config.clone());

        for _ in 0..5 {
            monitor.producer.write().add_block(vec![]).unwrap();
            monitor.collect_metrics();
        }

        let heights: Vec<u64> = monitor
            .metrics_history(10)
            .iter()
            .map(|m| m.block_height)
            .collect();
        assert_eq!(heights, [6, 5, 4]);
        assert_eq!(monitor.metrics_history(1)[0].block_height, 6);

        let persisted: Vec<RealtimeMetrics> =
            store.load(keys::METRICS_HISTORY).unwrap().unwrap();
        assert_eq!(persisted.len(), 3);

        let reopened = monitor_on(store, config);
        assert_eq!(reopened.metrics_history(10).len(), 3);
    }

    #[test]
    fn test_collect_survives_storage_failure() {
        let store = Arc::new(RefusingStore {
            refuse: Some(keys::METRICS_HISTORY),
            ..Default::default()
        });
        let monitor = monitor_on(store.clone(), MonitorConfig::default());

        let sample = monitor.collect_metrics();
        assert_eq!(sample.block_height, 1);
        assert_eq!(monitor.metrics_history(10).len(), 1);
        assert!(store.get_value(keys::METRICS_HISTORY).unwrap().is_none());
    }

    #[test]
    fn test_analytics_views() {
        let monitor = monitor();
        let tx = Transaction::new(TxKind::Vote, "v1", json!({}), None);
        monitor.producer.write().submit_transaction(tx).unwrap();
        monitor
            .producer
            .write()
            .process_transaction_batch()
            .unwrap()
            .unwrap();

        assert_eq!(monitor.validator_performance()[0].blocks_in_chain, 1);
        assert_eq!(monitor.transaction_analytics().on_chain, 1);
        assert_eq!(monitor.network_topology().nodes.len(), 6);
        assert_eq!(monitor.block_statistics(1).unwrap().transactions, 1);
        assert!(monitor.block_statistics(2).is_none());
    }

    #[tokio::test]
    async fn test_run_loop_collects_and_stops() {
        let monitor = Arc::new(monitor_on(
            Arc::new(MemoryStore::new()),
            MonitorConfig {
                collect_interval_secs: 1,
                ..Default::default()
            },
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.clone().run(shutdown_rx));

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(monitor.metrics_history(10).len(), 1);
    }
}
