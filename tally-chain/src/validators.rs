//! Validator rotation for PoA consensus.
//!
//! The active set is derived from the node table on every rotation:
//! - Ordered by node-table position
//! - Round-robin succession
//! - Fallback when the current authority has dropped out

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use tally_core::Node;

/// Where authority goes when the current validator is no longer active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Hand authority to the first active validator.
    #[default]
    RestartFromFirst,
    /// Walk the roster from the departed validator's slot and hand authority
    /// to the next one that is still active.
    FollowRoster,
}

/// Ordered set of validators eligible to produce blocks.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<String>,
    lookup: HashSet<String>,
}

impl ValidatorSet {
    /// Create a validator set. Duplicate ids keep their first position.
    pub fn new(validators: Vec<String>) -> Self {
        let mut lookup = HashSet::with_capacity(validators.len());
        let validators = validators
            .into_iter()
            .filter(|v| lookup.insert(v.clone()))
            .collect();
        Self { validators, lookup }
    }

    /// Active validators from a node table, in table order.
    pub fn active_from(nodes: &[Node]) -> Self {
        Self::new(
            nodes
                .iter()
                .filter(|n| n.is_active_validator())
                .map(|n| n.id.clone())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains(id)
    }

    /// Leader for a given round (round-robin).
    ///
    /// Returns None if the set is empty.
    pub fn leader_for_round(&self, round: u64) -> Option<&str> {
        if self.validators.is_empty() {
            return None;
        }
        let idx = (round % self.validators.len() as u64) as usize;
        Some(&self.validators[idx])
    }

    pub fn validators(&self) -> &[String] {
        &self.validators
    }

    /// Successor of `current` in rotation order.
    ///
    /// If `current` is in the set, the next one wraps around. Otherwise the
    /// policy decides; `roster` is the full validator list recorded in the
    /// consensus state, active or not. Returns None only for an empty set.
    pub fn next_after<'a>(
        &'a self,
        current: &str,
        roster: &'a [String],
        policy: RotationPolicy,
    ) -> Option<&'a str> {
        if self.validators.is_empty() {
            return None;
        }

        if let Some(pos) = self.validators.iter().position(|v| v == current) {
            return self.leader_for_round(pos as u64 + 1);
        }

        match policy {
            RotationPolicy::RestartFromFirst => self.leader_for_round(0),
            RotationPolicy::FollowRoster => {
                let Some(pos) = roster.iter().position(|v| v == current) else {
                    return self.leader_for_round(0);
                };
                roster
                    .iter()
                    .cycle()
                    .skip(pos + 1)
                    .take(roster.len())
                    .find(|v| self.contains(v))
                    .map(String::as_str)
                    .or_else(|| self.leader_for_round(0))
            }
        }
    }
}

impl PartialEq for ValidatorSet {
    fn eq(&self, other: &Self) -> bool {
        self.validators == other.validators
    }
}

impl Eq for ValidatorSet {}
