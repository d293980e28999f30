//! Election domain records the built-in rules operate on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MS_PER_DAY: f64 = 86_400_000.0;

/// A candidate standing in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            party: None,
        }
    }
}

/// An election with its voting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    pub title: String,
    pub candidates: Vec<Candidate>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Voter ids allowed to vote.
    #[serde(default)]
    pub eligible_voters: Vec<String>,
}

impl Election {
    /// Length of the voting window in (fractional) days.
    pub fn duration_days(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / MS_PER_DAY
    }

    /// Check if `at` falls inside `[start, end]`.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn is_eligible(&self, voter_id: &str) -> bool {
        self.eligible_voters.iter().any(|v| v == voter_id)
    }

    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }
}

/// Registration state of a voter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterStatus {
    #[default]
    Active,
    Suspended,
}

/// A registered voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub id: String,
    /// Identity checks passed.
    pub verified: bool,
    #[serde(default)]
    pub status: VoterStatus,
    /// Elections this voter has already voted in.
    #[serde(default)]
    pub voted_in: Vec<String>,
}

impl Voter {
    /// A verified, active voter with no votes cast.
    pub fn verified(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verified: true,
            status: VoterStatus::Active,
            voted_in: Vec::new(),
        }
    }

    pub fn has_voted_in(&self, election_id: &str) -> bool {
        self.voted_in.iter().any(|e| e == election_id)
    }
}

/// A ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: String,
    pub election_id: String,
    pub candidate_id: String,
}

impl Vote {
    pub fn new(
        voter_id: impl Into<String>,
        election_id: impl Into<String>,
        candidate_id: impl Into<String>,
    ) -> Self {
        Self {
            voter_id: voter_id.into(),
            election_id: election_id.into(),
            candidate_id: candidate_id.into(),
        }
    }
}
