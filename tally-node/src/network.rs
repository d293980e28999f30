//! Application context tying the producer, rule engine and monitor together.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tally_chain::{
    BlockProducer, Ledger, NetworkStatus, TransactionCheck, TransactionPool, TxVerification,
    Verdict,
};
use tally_core::{Block, Error, Result, Transaction, TxId, TxKind};
use tally_monitor::{HealthReport, Monitor};
use tally_rules::{ContractInput, ContractOutput, Election, RuleEngine, Vote, Voter};
use tally_storage::KvStore;

use crate::config::NodeConfig;

/// Screens batched transactions through the rule engine.
///
/// Runs while the producer lock is held; takes the rule engine lock itself.
pub struct RuleScreen<S: KvStore> {
    rules: Arc<RwLock<RuleEngine<S>>>,
}

impl<S: KvStore> TransactionCheck for RuleScreen<S> {
    fn check(&self, tx: &Transaction) -> Verdict {
        match self.rules.write().screen_transaction(tx) {
            Ok(v) if v.valid => Verdict::Admit,
            Ok(v) => Verdict::Reject(v.reason.unwrap_or_else(|| "rejected by rules".into())),
            Err(e) => Verdict::Reject(e.to_string()),
        }
    }
}

/// Point-in-time view of a node, as printed by `tally status`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub network: NetworkStatus,
    pub pending_transactions: usize,
    pub health: HealthReport,
}

/// A running election network on one store.
///
/// Lock order: producer before rules. Nothing here takes the producer lock
/// while holding the rules lock.
pub struct ElectionNetwork<S: KvStore + 'static> {
    producer: Arc<RwLock<BlockProducer<S>>>,
    rules: Arc<RwLock<RuleEngine<S>>>,
    monitor: Arc<Monitor<S>>,
}

impl<S: KvStore + 'static> ElectionNetwork<S> {
    /// Open every component on `store`, seeding whatever is missing.
    pub fn open(store: Arc<S>, config: &NodeConfig) -> Result<Self> {
        let ledger = Ledger::open(store.clone(), config.chain.clone())?;
        let pool = TransactionPool::open(store.clone(), config.pool.clone())?;
        let rules = Arc::new(RwLock::new(RuleEngine::open(store.clone())?));

        let producer = BlockProducer::new(ledger, pool, config.producer_config()).with_check(
            RuleScreen {
                rules: rules.clone(),
            },
        );
        let producer = Arc::new(RwLock::new(producer));

        let monitor = Arc::new(Monitor::open(
            store,
            producer.clone(),
            rules.clone(),
            config.monitor.clone(),
        )?);

        info!(
            network = %config.chain.network_id,
            height = producer.read().ledger().len(),
            "Election network opened"
        );
        Ok(Self {
            producer,
            rules,
            monitor,
        })
    }

    pub fn producer(&self) -> &Arc<RwLock<BlockProducer<S>>> {
        &self.producer
    }

    pub fn rules(&self) -> &Arc<RwLock<RuleEngine<S>>> {
        &self.rules
    }

    pub fn monitor(&self) -> &Arc<Monitor<S>> {
        &self.monitor
    }

    /// Enqueue a transaction built from its parts.
    pub fn submit_transaction(
        &self,
        kind: TxKind,
        from: &str,
        data: Value,
        to: Option<String>,
    ) -> Result<TxId> {
        let mut producer = self.producer.write();
        let tx = producer.pool().create_transaction(kind, from, data, to);
        producer.submit_transaction(tx)
    }

    /// Record a new election. Its rules are checked when it is batched.
    pub fn create_election(&self, admin: &str, election: &Election) -> Result<TxId> {
        self.submit_transaction(
            TxKind::ElectionCreate,
            admin,
            serde_json::to_value(election)?,
            None,
        )
    }

    pub fn update_election(&self, admin: &str, election: &Election) -> Result<TxId> {
        self.submit_transaction(
            TxKind::ElectionUpdate,
            admin,
            serde_json::to_value(election)?,
            None,
        )
    }

    pub fn register_voter(&self, registrar: &str, voter: &Voter) -> Result<TxId> {
        self.submit_transaction(
            TxKind::VoterRegister,
            registrar,
            serde_json::to_value(voter)?,
            None,
        )
    }

    /// Validate a ballot against the active voting rules, then enqueue it.
    ///
    /// A ballot the rules reject never reaches the pool. The ballot is
    /// recorded under its own voter and election ids, so those must match
    /// the records it was validated against.
    pub fn cast_vote(&self, vote: &Vote, voter: &Voter, election: &Election) -> Result<TxId> {
        if vote.voter_id != voter.id || vote.election_id != election.id {
            warn!(
                voter = %vote.voter_id,
                election = %vote.election_id,
                record_voter = %voter.id,
                record_election = %election.id,
                "Ballot does not match its records"
            );
            return Err(Error::invalid_transaction(format!(
                "ballot {}/{} does not match voter {} in election {}",
                vote.voter_id, vote.election_id, voter.id, election.id
            )));
        }
        let verdict = self.rules.write().validate_vote(vote, voter, election)?;
        if !verdict.valid {
            let reason = verdict.reason.unwrap_or_else(|| "vote rejected".into());
            warn!(voter = %vote.voter_id, election = %vote.election_id, %reason, "Vote rejected");
            return Err(Error::invalid_transaction(reason));
        }
        self.submit_transaction(
            TxKind::Vote,
            &vote.voter_id,
            serde_json::to_value(vote)?,
            Some(vote.election_id.clone()),
        )
    }

    /// Execute a contract and record the call as a `smart_contract`
    /// transaction carrying its output.
    pub fn invoke_contract(
        &self,
        caller: &str,
        contract_id: &str,
        input: &ContractInput,
    ) -> Result<(ContractOutput, TxId)> {
        let output = self.rules.write().execute(contract_id, input)?;
        let data = json!({
            "contract_id": contract_id,
            "input": input.name(),
            "output": output,
        });
        let id = self.submit_transaction(
            TxKind::SmartContract,
            caller,
            data,
            Some(contract_id.to_string()),
        )?;
        Ok((output, id))
    }

    /// Seal the next priority batch, if anything passes screening.
    pub fn process_batch(&self) -> Result<Option<Block>> {
        self.producer.write().process_transaction_batch()
    }

    pub fn verify_transaction(&self, id: &TxId) -> TxVerification {
        self.producer.read().verify_transaction(id)
    }

    pub fn report(&self) -> NodeReport {
        let health = self.monitor.health();
        let producer = self.producer.read();
        NodeReport {
            network: producer.ledger().network_status(),
            pending_transactions: producer.pool().pending_count(),
            health,
        }
    }

    /// Start the producer and metrics loops. Both stop when `shutdown`
    /// flips to true.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(BlockProducer::run(self.producer.clone(), shutdown.clone())),
            tokio::spawn(self.monitor.clone().run(shutdown)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tally_core::TxStatus;
    use tally_rules::{Candidate, ContractKind, ValidationResult};
    use tally_storage::MemoryStore;

    fn network() -> ElectionNetwork<MemoryStore> {
        ElectionNetwork::open(Arc::new(MemoryStore::new()), &NodeConfig::default()).unwrap()
    }

    fn election(candidates: usize) -> Election {
        let start = tally_core::now() - Duration::hours(1);
        Election {
            id: "mayor-2026".into(),
            title: "Mayor".into(),
            candidates: (0..candidates)
                .map(|i| Candidate::new(format!("c{i}"), format!("Candidate {i}")))
                .collect(),
            start,
            end: start + Duration::days(7),
            eligible_voters: vec!["alice".into(), "bob".into()],
        }
    }

    fn status(net: &ElectionNetwork<MemoryStore>, id: &TxId) -> Option<TxStatus> {
        net.producer().read().pool().get(id).map(|tx| tx.status)
    }

    #[test]
    fn test_invalid_election_fails_at_batch() {
        let net = network();
        let good = net.create_election("admin", &election(2)).unwrap();
        let bad = net.create_election("admin", &election(1)).unwrap();

        let block = net.process_batch().unwrap().unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].id, good);
        assert_eq!(status(&net, &bad), Some(TxStatus::Failed));
        assert_eq!(net.verify_transaction(&bad), TxVerification::Failed);
    }

    #[test]
    fn test_cast_vote_checks_rules_first() {
        let net = network();
        let e = election(2);

        let id = net
            .cast_vote(&Vote::new("alice", &e.id, "c0"), &Voter::verified("alice"), &e)
            .unwrap();
        assert_eq!(net.producer().read().pool().get(&id).unwrap().kind, TxKind::Vote);

        let err = net
            .cast_vote(&Vote::new("carol", &e.id, "c0"), &Voter::verified("carol"), &e)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction { .. }));
        assert_eq!(net.producer().read().pool().len(), 1);
    }

    #[test]
    fn test_cast_vote_rejects_mismatched_ballot() {
        let net = network();
        let e = election(2);
        let alice = Voter::verified("alice");

        let err = net
            .cast_vote(&Vote::new("carol", &e.id, "c0"), &alice, &e)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction { .. }));

        let err = net
            .cast_vote(&Vote::new("alice", "other-election", "c0"), &alice, &e)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction { .. }));

        assert!(net.producer().read().pool().is_empty());
    }

    #[test]
    fn test_register_voter_is_sealed() {
        let net = network();
        let id = net.register_voter("registrar", &Voter::verified("alice")).unwrap();
        net.process_batch().unwrap().unwrap();
        assert!(matches!(
            net.verify_transaction(&id),
            TxVerification::Confirmed { block_index: 1, .. }
        ));
    }

    #[test]
    fn test_invoke_contract_records_call() {
        let net = network();
        let id = net
            .rules()
            .read()
            .contracts()
            .iter()
            .find(|c| c.kind == ContractKind::ElectionRules)
            .map(|c| c.id.clone())
            .unwrap();

        let (output, tx_id) = net
            .invoke_contract("auditor", &id, &ContractInput::Election(election(3)))
            .unwrap();
        assert_eq!(output, ContractOutput::Validation(ValidationResult::valid()));

        let block = net.process_batch().unwrap().unwrap();
        assert_eq!(block.transactions[0].id, tx_id);
        assert_eq!(block.transactions[0].data["contract_id"], json!(id));

        assert!(net
            .invoke_contract("auditor", "missing", &ContractInput::Data(json!({})))
            .is_err());
    }

    #[test]
    fn test_report() {
        let net = network();
        net.register_voter("registrar", &Voter::verified("bob")).unwrap();
        let report = net.report();
        assert_eq!(report.network.chain_length, 1);
        assert_eq!(report.pending_transactions, 1);
        assert!(report.health.issues.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_loops_produce_and_collect() {
        let config = NodeConfig {
            block_interval_ms: 10,
            ..Default::default()
        };
        let net = ElectionNetwork::open(Arc::new(MemoryStore::new()), &config).unwrap();
        let id = net.register_voter("registrar", &Voter::verified("alice")).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = net.spawn(shutdown_rx);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(matches!(
            net.verify_transaction(&id),
            TxVerification::Confirmed { .. }
        ));
        assert!(!net.monitor().metrics_history(10).is_empty());
    }
}
