//! Property-based tests for the tally.

use proptest::prelude::*;

use crate::builtins::tally;
use crate::election::{Candidate, Vote};

fn arb_ballots() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..6).prop_flat_map(|n| (Just(n), prop::collection::vec(0..n, 0..60)))
}

proptest! {
    #[test]
    fn tally_is_ranked_and_complete((n, picks) in arb_ballots()) {
        let candidates: Vec<Candidate> =
            (0..n).map(|i| Candidate::new(format!("c{i}"), format!("C{i}"))).collect();
        let votes: Vec<Vote> = picks
            .iter()
            .enumerate()
            .map(|(i, c)| Vote::new(format!("v{i}"), "e", format!("c{c}")))
            .collect();

        let result = tally(&votes, &candidates);
        prop_assert_eq!(result.results.len(), n);
        prop_assert_eq!(result.total_votes, votes.len() as u64);

        for pair in result.results.windows(2) {
            prop_assert!(pair[0].votes >= pair[1].votes);
            if pair[0].votes == pair[1].votes {
                prop_assert!(pair[0].candidate_id < pair[1].candidate_id);
            }
        }

        let share: f64 = result.results.iter().map(|r| r.percentage).sum();
        if votes.is_empty() {
            prop_assert_eq!(share, 0.0);
        } else {
            prop_assert!((share - 100.0).abs() < 1e-6);
        }
        prop_assert_eq!(result.winner.as_ref(), result.results.first());
    }
}
