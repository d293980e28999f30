//! Contract records and the closed set of rules they carry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tally_core::{Error, Result};

use crate::builtins;
use crate::election::{Candidate, Election, Vote, Voter};

/// Contract kind tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ContractKind {
    ElectionRules,
    VotingValidation,
    ResultCalculation,
    /// Any other tag. Never equal to a built-in tag.
    Custom(String),
}

impl ContractKind {
    pub fn as_str(&self) -> &str {
        match self {
            ContractKind::ElectionRules => "election_rules",
            ContractKind::VotingValidation => "voting_validation",
            ContractKind::ResultCalculation => "result_calculation",
            ContractKind::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(Error::invalid_contract("empty contract type")),
            "election_rules" => Ok(ContractKind::ElectionRules),
            "voting_validation" => Ok(ContractKind::VotingValidation),
            "result_calculation" => Ok(ContractKind::ResultCalculation),
            other => Ok(ContractKind::Custom(other.to_string())),
        }
    }
}

impl From<ContractKind> for String {
    fn from(kind: ContractKind) -> Self {
        kind.as_str().to_string()
    }
}

impl TryFrom<String> for ContractKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A contract body. There is no interpreter: every rule is one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Candidate count and voting-window length.
    ElectionRules {
        min_candidates: usize,
        max_duration_days: f64,
    },
    /// Voter standing, double voting, eligibility and voting window.
    VotingValidation,
    /// Per-candidate counts, percentages and winner.
    ResultCalculation,
    /// Numeric bound check on the JSON field at a dotted path.
    FieldRange {
        field: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl Rule {
    /// The built-in election rule: at least 2 candidates, at most 365 days.
    pub fn default_election_rules() -> Self {
        Rule::ElectionRules {
            min_candidates: 2,
            max_duration_days: 365.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Rule::ElectionRules { .. } => "election_rules",
            Rule::VotingValidation => "voting_validation",
            Rule::ResultCalculation => "result_calculation",
            Rule::FieldRange { .. } => "field_range",
        }
    }

    /// Check if this rule may back a contract of `kind`.
    pub fn fits(&self, kind: &ContractKind) -> bool {
        match kind {
            ContractKind::ElectionRules => matches!(self, Rule::ElectionRules { .. }),
            ContractKind::VotingValidation => matches!(self, Rule::VotingValidation),
            ContractKind::ResultCalculation => matches!(self, Rule::ResultCalculation),
            ContractKind::Custom(_) => true,
        }
    }

    /// Run the rule. A mismatched input or an unreadable field is an
    /// execution failure.
    pub fn execute(&self, input: &ContractInput, now: DateTime<Utc>) -> Result<ContractOutput> {
        match (self, input) {
            (
                Rule::ElectionRules {
                    min_candidates,
                    max_duration_days,
                },
                ContractInput::Election(election),
            ) => Ok(ContractOutput::Validation(builtins::check_election(
                election,
                *min_candidates,
                *max_duration_days,
            ))),
            (
                Rule::VotingValidation,
                ContractInput::Vote {
                    vote,
                    voter,
                    election,
                },
            ) => Ok(ContractOutput::Validation(builtins::check_vote(
                vote, voter, election, now,
            ))),
            (Rule::ResultCalculation, ContractInput::Tally { votes, candidates }) => {
                Ok(ContractOutput::Tally(builtins::tally(votes, candidates)))
            }
            (Rule::FieldRange { field, min, max }, input) => {
                let data = match input {
                    ContractInput::Data(value) => value.clone(),
                    other => serde_json::to_value(other)?,
                };
                builtins::check_field_range(&data, field, *min, *max)
                    .map(ContractOutput::Validation)
                    .map_err(Error::contract_execution)
            }
            (rule, input) => Err(Error::contract_execution(format!(
                "{} rule cannot run on {} input",
                rule.name(),
                input.name()
            ))),
        }
    }
}

/// Arguments passed to a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractInput {
    Election(Election),
    Vote {
        vote: Vote,
        voter: Voter,
        election: Election,
    },
    Tally {
        votes: Vec<Vote>,
        candidates: Vec<Candidate>,
    },
    Data(Value),
}

impl ContractInput {
    pub fn name(&self) -> &'static str {
        match self {
            ContractInput::Election(_) => "election",
            ContractInput::Vote { .. } => "vote",
            ContractInput::Tally { .. } => "tally",
            ContractInput::Data(_) => "data",
        }
    }
}

/// Outcome of a validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// One row of a tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub name: String,
    pub votes: u64,
    /// Share of all votes, 0–100. Zero when no votes were cast.
    pub percentage: f64,
}

/// Ranked election result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyResult {
    /// Descending by votes; ties keep candidate order.
    pub results: Vec<CandidateResult>,
    pub total_votes: u64,
    /// First row, or `None` without candidates.
    pub winner: Option<CandidateResult>,
}

/// What a contract returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractOutput {
    Validation(ValidationResult),
    Tally(TallyResult),
}

impl ContractOutput {
    pub fn into_validation(self) -> Result<ValidationResult> {
        match self {
            ContractOutput::Validation(result) => Ok(result),
            ContractOutput::Tally(_) => Err(Error::contract_execution(
                "expected a validation result, got a tally",
            )),
        }
    }

    pub fn into_tally(self) -> Result<TallyResult> {
        match self {
            ContractOutput::Tally(result) => Ok(result),
            ContractOutput::Validation(_) => Err(Error::contract_execution(
                "expected a tally, got a validation result",
            )),
        }
    }
}

/// What a caller supplies to deploy a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContractKind,
    pub rule: Rule,
    pub deployer: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// A deployed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContractKind,
    pub rule: Rule,
    pub deployer: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub deployed_at: DateTime<Utc>,
    pub active: bool,
    pub execution_count: u64,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_executed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}
