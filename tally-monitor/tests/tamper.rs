//! Health and anomalies after the persisted chain is edited on disk.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tally_chain::{BlockProducer, ChainConfig, Ledger, PoolConfig, ProducerConfig, TransactionPool};
use tally_core::{Transaction, TxKind};
use tally_monitor::{AnomalyKind, HealthStatus, Monitor, MonitorConfig, Severity};
use tally_rules::RuleEngine;
use tally_storage::{keys, FileStore, KvStore};

fn open(store: Arc<FileStore>) -> Monitor<FileStore> {
    let ledger = Ledger::open(store.clone(), ChainConfig::default()).unwrap();
    let pool = TransactionPool::open(store.clone(), PoolConfig::default()).unwrap();
    let producer = BlockProducer::new(ledger, pool, ProducerConfig::default());
    let rules = RuleEngine::open(store.clone()).unwrap();
    Monitor::open(
        store,
        Arc::new(RwLock::new(producer)),
        Arc::new(RwLock::new(rules)),
        MonitorConfig::default(),
    )
    .unwrap()
}

#[test]
fn edited_chain_is_flagged_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());

    {
        let ledger = Ledger::open(store.clone(), ChainConfig::default()).unwrap();
        let pool = TransactionPool::open(store.clone(), PoolConfig::default()).unwrap();
        let mut producer = BlockProducer::new(ledger, pool, ProducerConfig::default());
        for voter in ["v1", "v2", "v3"] {
            let tx = Transaction::new(TxKind::Vote, voter, json!({ "candidate": "c1" }), None);
            producer.submit_transaction(tx).unwrap();
            producer.process_transaction_batch().unwrap();
        }
    }

    let healthy = open(store.clone());
    assert_eq!(healthy.health().status, HealthStatus::Healthy);
    healthy.collect_metrics();

    let mut raw = store.get_value(keys::CHAIN).unwrap().unwrap();
    raw[2]["transactions"][0]["from"] = json!("mallory");
    store.set_value(keys::CHAIN, raw).unwrap();

    let monitor = open(store);
    let report = monitor.health();
    assert_eq!(report.status, HealthStatus::Critical);
    assert!(!report.metrics.chain_valid);

    let anomalies = monitor.detect_anomalies();
    assert!(anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::Security && a.severity == Severity::High));

    // History written before the edit is still there.
    assert_eq!(monitor.metrics_history(10).len(), 1);
    assert!(monitor.metrics_history(10)[0].chain_valid);
}
