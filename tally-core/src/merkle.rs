//! Merkle commitments over ordered transaction lists.
//!
//! Levels are folded pairwise; an odd trailing element is carried up to the
//! next level unchanged rather than duplicated. The root is therefore
//! sensitive to leaf order.

use crate::crypto::{hash, hash_pair, Hash};
use crate::transaction::Transaction;

/// Leaf material hashed to produce the root of an empty list.
pub const EMPTY_ROOT_SENTINEL: &[u8] = b"empty";

/// Compute the merkle root of a list of leaf hashes.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return hash(EMPTY_ROOT_SENTINEL);
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(*left, *right)),
                [odd] => next.push(*odd),
                _ => unreachable!("chunks(2) yields one or two elements"),
            }
        }
        level = next;
    }

    level[0]
}

/// Leaf hash of a transaction: digest of its canonical (signed) fields.
pub fn transaction_leaf(tx: &Transaction) -> Hash {
    hash(&tx.canonical_bytes())
}

/// Compute the merkle root of a list of transactions.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(transaction_leaf).collect();
    merkle_root(&leaves)
}
