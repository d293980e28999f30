//! Rule implementations.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::contract::{CandidateResult, TallyResult, ValidationResult};
use crate::election::{Candidate, Election, Vote, Voter, VoterStatus};

/// Candidate count and voting-window length.
pub fn check_election(
    election: &Election,
    min_candidates: usize,
    max_duration_days: f64,
) -> ValidationResult {
    if election.candidates.len() < min_candidates {
        return ValidationResult::invalid(format!(
            "election requires at least {min_candidates} candidates, got {}",
            election.candidates.len()
        ));
    }

    let days = election.duration_days();
    if days <= 0.0 || days > max_duration_days {
        return ValidationResult::invalid(format!(
            "election duration must be more than 0 and at most {max_duration_days} days, got {days:.2}"
        ));
    }

    ValidationResult::valid()
}

/// Ballot identity, voter standing, double voting, eligibility and voting
/// window, in that order. The first failure is reported.
///
/// The ballot must name the same voter and election as the records it is
/// checked against.
pub fn check_vote(
    vote: &Vote,
    voter: &Voter,
    election: &Election,
    now: DateTime<Utc>,
) -> ValidationResult {
    if vote.voter_id != voter.id {
        return ValidationResult::invalid(format!(
            "ballot names voter {} but voter record is {}",
            vote.voter_id, voter.id
        ));
    }
    if vote.election_id != election.id {
        return ValidationResult::invalid(format!(
            "ballot is for election {}, not {}",
            vote.election_id, election.id
        ));
    }
    if !voter.verified || voter.status != VoterStatus::Active {
        return ValidationResult::invalid(format!(
            "voter {} is not verified or not active",
            voter.id
        ));
    }
    if voter.has_voted_in(&election.id) {
        return ValidationResult::invalid(format!(
            "voter {} has already voted in election {}",
            voter.id, election.id
        ));
    }
    if !election.is_eligible(&voter.id) {
        return ValidationResult::invalid(format!(
            "voter {} is not eligible for election {}",
            voter.id, election.id
        ));
    }
    if !election.is_open_at(now) {
        return ValidationResult::invalid(format!("election {} is not open", election.id));
    }
    if election.candidate(&vote.candidate_id).is_none() {
        return ValidationResult::invalid(format!("unknown candidate {}", vote.candidate_id));
    }
    ValidationResult::valid()
}

/// Count votes per candidate and rank them.
///
/// Votes for unknown candidates are ignored. The sort is stable, so ties
/// keep the order of `candidates`.
pub fn tally(votes: &[Vote], candidates: &[Candidate]) -> TallyResult {
    let mut results: Vec<CandidateResult> = candidates
        .iter()
        .map(|c| CandidateResult {
            candidate_id: c.id.clone(),
            name: c.name.clone(),
            votes: votes.iter().filter(|v| v.candidate_id == c.id).count() as u64,
            percentage: 0.0,
        })
        .collect();

    let total_votes: u64 = results.iter().map(|r| r.votes).sum();
    if total_votes > 0 {
        for row in &mut results {
            row.percentage = row.votes as f64 * 100.0 / total_votes as f64;
        }
    }

    results.sort_by(|a, b| b.votes.cmp(&a.votes));
    let winner = results.first().cloned();

    TallyResult {
        results,
        total_votes,
        winner,
    }
}

/// Bound check on the number at `field` (dotted path) inside `data`.
pub fn check_field_range(
    data: &Value,
    field: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<ValidationResult, String> {
    let pointer = format!("/{}", field.replace('.', "/"));
    let value = data
        .pointer(&pointer)
        .ok_or_else(|| format!("field {field} is missing"))?;
    let number = value
        .as_f64()
        .ok_or_else(|| format!("field {field} is not a number"))?;

    if let Some(min) = min {
        if number < min {
            return Ok(ValidationResult::invalid(format!(
                "{field} is {number}, below minimum {min}"
            )));
        }
    }
    if let Some(max) = max {
        if number > max {
            return Ok(ValidationResult::invalid(format!(
                "{field} is {number}, above maximum {max}"
            )));
        }
    }
    Ok(ValidationResult::valid())
}
