//! Contract table and execution.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use tally_core::{Error, Result, Transaction, TxKind};
use tally_storage::{keys, KvStore, KvStoreExt};

use crate::contract::{
    Contract, ContractInput, ContractKind, ContractOutput, ContractSpec, Rule, TallyResult,
    ValidationResult,
};
use crate::election::{Candidate, Election, Vote, Voter};

/// Identity that deploys the built-in contracts.
pub const SYSTEM_DEPLOYER: &str = "system";

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Aggregate contract counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetrics {
    pub total: usize,
    pub active: usize,
    pub total_executions: u64,
    pub by_kind: BTreeMap<String, usize>,
}

/// Persisted contract table with a rule executor.
pub struct RuleEngine<S: KvStore> {
    store: Arc<S>,
    contracts: Vec<Contract>,
    clock: Clock,
}

impl<S: KvStore> RuleEngine<S> {
    /// Open the engine, seeding the three built-in contracts if the table is
    /// empty.
    pub fn open(store: Arc<S>) -> Result<Self> {
        let contracts: Vec<Contract> = store.load(keys::CONTRACTS)?.unwrap_or_default();
        let mut engine = Self {
            store,
            contracts,
            clock: Box::new(tally_core::now),
        };
        if engine.contracts.is_empty() {
            engine.seed_builtins()?;
        }
        Ok(engine)
    }

    /// Replace the wall clock used for voting windows and timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn seed_builtins(&mut self) -> Result<()> {
        let builtins = [
            (
                "Election Rules",
                ContractKind::ElectionRules,
                Rule::default_election_rules(),
                json!({ "min_candidates": 2, "max_duration_days": 365 }),
            ),
            (
                "Voting Validation",
                ContractKind::VotingValidation,
                Rule::VotingValidation,
                json!({}),
            ),
            (
                "Result Calculation",
                ContractKind::ResultCalculation,
                Rule::ResultCalculation,
                json!({}),
            ),
        ];

        let now = (self.clock)();
        for (name, kind, rule, parameters) in builtins {
            let parameters = match parameters {
                Value::Object(map) => map.into_iter().collect(),
                _ => BTreeMap::new(),
            };
            self.contracts.push(Contract {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                kind,
                rule,
                deployer: SYSTEM_DEPLOYER.to_string(),
                deployed_at: now,
                active: true,
                execution_count: 0,
                last_executed: None,
                parameters,
            });
        }
        self.persist()?;
        info!(count = self.contracts.len(), "Seeded built-in contracts");
        Ok(())
    }

    /// Deploy a contract. Names and kinds need not be unique; the earliest
    /// active contract of a kind wins lookups by kind.
    pub fn deploy(&mut self, spec: ContractSpec) -> Result<Contract> {
        if spec.name.trim().is_empty() {
            return Err(Error::invalid_contract("missing name"));
        }
        if !spec.rule.fits(&spec.kind) {
            return Err(Error::invalid_contract(format!(
                "{} rule cannot back a {} contract",
                spec.rule.name(),
                spec.kind
            )));
        }

        let contract = Contract {
            id: uuid::Uuid::new_v4().to_string(),
            name: spec.name,
            kind: spec.kind,
            rule: spec.rule,
            deployer: spec.deployer,
            deployed_at: (self.clock)(),
            active: true,
            execution_count: 0,
            last_executed: None,
            parameters: spec.parameters,
        };

        self.contracts.push(contract.clone());
        if let Err(e) = self.persist() {
            self.contracts.pop();
            return Err(e);
        }

        info!(id = %contract.id, kind = %contract.kind, name = %contract.name, "Deployed contract");
        Ok(contract)
    }

    /// Run a contract by id.
    ///
    /// Fails if the id is unknown or the contract is inactive. A rule failure
    /// comes back as [`Error::ContractExecution`].
    pub fn execute(&mut self, id: &str, input: &ContractInput) -> Result<ContractOutput> {
        let now = (self.clock)();
        let contract = self
            .contracts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::contract_not_found(id))?;
        if !contract.active {
            return Err(Error::contract_inactive(id));
        }

        let output = contract.rule.execute(input, now)?;
        contract.execution_count += 1;
        contract.last_executed = Some(now);
        debug!(id, executions = contract.execution_count, "Executed contract");

        if let Err(e) = self.persist() {
            warn!(id, error = %e, "Failed to persist contract counters");
        }
        Ok(output)
    }

    /// Run the first active contract of `kind`.
    ///
    /// A rule failure is folded into an invalid [`ValidationResult`].
    pub fn execute_by_type(
        &mut self,
        kind: &ContractKind,
        input: &ContractInput,
    ) -> Result<ContractOutput> {
        let id = self
            .contracts
            .iter()
            .find(|c| c.active && &c.kind == kind)
            .map(|c| c.id.clone())
            .ok_or_else(|| Error::contract_not_found(format!("no active {kind} contract")))?;

        match self.execute(&id, input) {
            Err(Error::ContractExecution { message, .. }) => Ok(ContractOutput::Validation(
                ValidationResult::invalid(message),
            )),
            other => other,
        }
    }

    /// Deactivate a contract. It stays in the table.
    pub fn deactivate(&mut self, id: &str) -> Result<()> {
        let contract = self
            .contracts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::contract_not_found(id))?;
        if !contract.active {
            return Ok(());
        }
        contract.active = false;
        self.persist()?;
        info!(id, "Deactivated contract");
        Ok(())
    }

    /// Check an election against the active election rules.
    pub fn validate_election(&mut self, election: &Election) -> Result<ValidationResult> {
        self.execute_by_type(
            &ContractKind::ElectionRules,
            &ContractInput::Election(election.clone()),
        )?
        .into_validation()
    }

    /// Check a ballot against the active voting validation.
    pub fn validate_vote(
        &mut self,
        vote: &Vote,
        voter: &Voter,
        election: &Election,
    ) -> Result<ValidationResult> {
        let input = ContractInput::Vote {
            vote: vote.clone(),
            voter: voter.clone(),
            election: election.clone(),
        };
        self.execute_by_type(&ContractKind::VotingValidation, &input)?
            .into_validation()
    }

    /// Tally votes with the active result calculation.
    pub fn calculate_results(
        &mut self,
        votes: &[Vote],
        candidates: &[Candidate],
    ) -> Result<TallyResult> {
        let input = ContractInput::Tally {
            votes: votes.to_vec(),
            candidates: candidates.to_vec(),
        };
        match self.execute_by_type(&ContractKind::ResultCalculation, &input)? {
            ContractOutput::Tally(result) => Ok(result),
            ContractOutput::Validation(v) => Err(Error::contract_execution(
                v.reason.unwrap_or_else(|| "result calculation did not tally".into()),
            )),
        }
    }

    /// Decide whether a pooled transaction may be sealed into a block.
    ///
    /// Election payloads must pass the election rules and contract calls
    /// must target an active contract. Votes are validated when cast, not
    /// here.
    pub fn screen_transaction(&mut self, tx: &Transaction) -> Result<ValidationResult> {
        match tx.kind {
            TxKind::ElectionCreate | TxKind::ElectionUpdate => {
                match serde_json::from_value::<Election>(tx.data.clone()) {
                    Ok(election) => self.validate_election(&election),
                    Err(e) => Ok(ValidationResult::invalid(format!(
                        "malformed election payload: {e}"
                    ))),
                }
            }
            TxKind::SmartContract => {
                let Some(id) = tx.data.get("contract_id").and_then(Value::as_str) else {
                    return Ok(ValidationResult::invalid("missing contract_id"));
                };
                Ok(match self.contract(id) {
                    Some(c) if c.active => ValidationResult::valid(),
                    Some(_) => ValidationResult::invalid(format!("contract {id} is inactive")),
                    None => ValidationResult::invalid(format!("unknown contract {id}")),
                })
            }
            TxKind::Vote | TxKind::VoterRegister => Ok(ValidationResult::valid()),
        }
    }

    /// Totals, active count, executions and count per kind.
    pub fn metrics(&self) -> ContractMetrics {
        let mut by_kind = BTreeMap::new();
        for c in &self.contracts {
            *by_kind.entry(c.kind.to_string()).or_insert(0) += 1;
        }
        ContractMetrics {
            total: self.contracts.len(),
            active: self.contracts.iter().filter(|c| c.active).count(),
            total_executions: self.contracts.iter().map(|c| c.execution_count).sum(),
            by_kind,
        }
    }

    pub fn contract(&self, id: &str) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.id == id)
    }

    /// The contract table in deployment order.
    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    fn persist(&self) -> Result<()> {
        self.store.save(keys::CONTRACTS, &self.contracts)
    }
}
