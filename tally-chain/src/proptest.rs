//! Property-based tests for batching and rotation.

use std::sync::Arc;

use chrono::DateTime;
use proptest::prelude::*;
use serde_json::json;
use tally_core::{Transaction, TxKind};
use tally_storage::MemoryStore;

use crate::pool::{PoolConfig, TransactionPool};
use crate::validators::{RotationPolicy, ValidatorSet};

fn arb_kind() -> impl Strategy<Value = TxKind> {
    prop::sample::select(TxKind::ALL.to_vec())
}

fn arb_pending() -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec((arb_kind(), 0i64..10_000), 0..40).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(kind, ms)| {
                let at = DateTime::from_timestamp_millis(1_700_000_000_000 + ms)
                    .expect("in range");
                Transaction::with_timestamp(kind, "sender", json!({ "ms": ms }), None, at)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn batch_is_sorted_prefix_of_pending(txs in arb_pending()) {
        let mut pool =
            TransactionPool::open(Arc::new(MemoryStore::new()), PoolConfig::default()).unwrap();
        for tx in &txs {
            pool.submit(tx.clone()).unwrap();
        }

        let batch = pool.batch_for_processing();
        prop_assert_eq!(batch.len(), txs.len().min(10));

        let key = |tx: &Transaction| (tx.kind.priority(), tx.timestamp);
        for pair in batch.windows(2) {
            prop_assert!(key(&pair[0]) <= key(&pair[1]));
        }

        if let Some(last) = batch.last() {
            let batched: Vec<_> = batch.iter().map(|tx| &tx.id).collect();
            for tx in txs.iter().filter(|tx| !batched.contains(&&tx.id)) {
                prop_assert!(key(tx) >= key(last));
            }
        }
    }

    #[test]
    fn rotation_lands_on_n_mod_m(m in 1usize..8, n in 0u64..50) {
        let ids: Vec<String> = (0..m).map(|i| format!("validator-{i}")).collect();
        let set = ValidatorSet::new(ids.clone());

        let mut current = ids[0].clone();
        for _ in 0..n {
            current = set
                .next_after(&current, &ids, RotationPolicy::default())
                .unwrap()
                .to_string();
        }
        prop_assert_eq!(current, ids[(n % m as u64) as usize].clone());
    }
}
