//! Rule engine for the Tally election ledger.
//!
//! Contracts are records in a persisted table, each carrying a typed
//! [`Rule`]. There is no script interpreter: the built-in kinds map to the
//! election, vote and tally rules, and custom kinds use data-driven rules
//! such as [`Rule::FieldRange`].
//!
//! ```ignore
//! let mut engine = RuleEngine::open(store)?;
//! let verdict = engine.validate_election(&election)?;
//! if !verdict.valid {
//!     println!("rejected: {}", verdict.reason.unwrap_or_default());
//! }
//! ```

pub mod builtins;
pub mod contract;
pub mod election;
mod engine;

#[cfg(test)]
mod proptest;

pub use contract::{
    CandidateResult, Contract, ContractInput, ContractKind, ContractOutput, ContractSpec, Rule,
    TallyResult, ValidationResult,
};
pub use election::{Candidate, Election, Vote, Voter, VoterStatus};
pub use engine::{ContractMetrics, RuleEngine, SYSTEM_DEPLOYER};
