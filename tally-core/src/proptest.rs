//! Property-based tests for core types.
//!
//! Uses proptest to verify invariants hold for arbitrary inputs.

use proptest::prelude::*;
use serde_json::json;

use crate::block::{Block, BlockBuilder};
use crate::crypto::{hash, Hash};
use crate::merkle::{merkle_root, transactions_root};
use crate::transaction::{Transaction, TxKind};

fn arb_kind() -> impl Strategy<Value = TxKind> {
    prop_oneof![
        Just(TxKind::Vote),
        Just(TxKind::ElectionCreate),
        Just(TxKind::ElectionUpdate),
        Just(TxKind::VoterRegister),
        Just(TxKind::SmartContract),
    ]
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (arb_kind(), "[a-z]{1,12}", any::<u32>())
        .prop_map(|(kind, from, n)| Transaction::new(kind, from, json!({ "n": n }), None))
}

fn arb_leaves() -> impl Strategy<Value = Vec<Hash>> {
    prop::collection::vec(any::<[u8; 8]>(), 0..40)
        .prop_map(|seeds| seeds.iter().map(|s| hash(s)).collect())
}

proptest! {
    #[test]
    fn merkle_root_is_deterministic(leaves in arb_leaves()) {
        prop_assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
    }

    #[test]
    fn merkle_root_changes_when_distinct_leaves_swap(
        leaves in arb_leaves().prop_filter("need two leaves", |l| l.len() >= 2),
        i in any::<prop::sample::Index>(),
        j in any::<prop::sample::Index>(),
    ) {
        let a = i.index(leaves.len());
        let b = j.index(leaves.len());
        prop_assume!(leaves[a] != leaves[b]);

        let mut swapped = leaves.clone();
        swapped.swap(a, b);
        prop_assert_ne!(merkle_root(&leaves), merkle_root(&swapped));
    }

    #[test]
    fn stored_root_reproduces_from_stored_order(
        txs in prop::collection::vec(arb_transaction(), 0..12),
    ) {
        let genesis = Block::genesis(crate::now());
        let block = BlockBuilder::new("validator-1")
            .parent(&genesis)
            .transactions(txs)
            .seal();

        prop_assert_eq!(block.merkle_root, transactions_root(&block.transactions));
        prop_assert!(block.validate(Some(&genesis)).is_ok());
    }

    #[test]
    fn new_transactions_verify(tx in arb_transaction()) {
        prop_assert!(tx.verify_signature());
        prop_assert!(tx.validate().is_ok());
        prop_assert_eq!(tx.gas_limit, tx.kind.gas_limit());
    }
}
