//! Storage layer for Tally.
//!
//! Every piece of ledger state is a named collection persisted as one JSON
//! document through [`KvStore`]:
//!
//! | Key | Contents |
//! |---|---|
//! | [`keys::CHAIN`] | ordered blocks |
//! | [`keys::NODES`] | node table |
//! | [`keys::CONSENSUS`] | consensus state |
//! | [`keys::TRANSACTION_POOL`] | pooled transactions |
//! | [`keys::CONTRACTS`] | contract table |
//! | [`keys::METRICS_HISTORY`] | bounded metrics history |
//!
//! ```ignore
//! use tally_storage::{FileStore, KvStoreExt, keys};
//!
//! let store = FileStore::open("./data")?;
//! let chain: Option<Vec<Block>> = store.load(keys::CHAIN)?;
//! ```

mod file;
mod memory;
mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{KvStore, KvStoreExt};

/// Collection keys.
pub mod keys {
    pub const CHAIN: &str = "blockchain";
    pub const NODES: &str = "network_nodes";
    pub const CONSENSUS: &str = "consensus_state";
    pub const TRANSACTION_POOL: &str = "transaction_pool";
    pub const CONTRACTS: &str = "smart_contracts";
    pub const METRICS_HISTORY: &str = "metrics_history";
}
