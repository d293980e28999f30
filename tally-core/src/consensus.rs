//! Consensus state singleton.

use serde::{Deserialize, Serialize};

/// Default target block time in milliseconds.
pub const DEFAULT_BLOCK_TIME_MS: u64 = 3000;

/// Default difficulty.
pub const DEFAULT_DIFFICULTY: u32 = 3;

/// Block production mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    /// Validators take turns; no nonce search.
    #[serde(rename = "PoA")]
    ProofOfAuthority,
    /// Nonce search until the hash has `difficulty` leading zero digits.
    #[serde(rename = "PoW")]
    ProofOfWork,
}

/// Current consensus parameters and authority pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    pub mechanism: Mechanism,
    /// Validator designated to produce the next block.
    pub current_validator: String,
    /// Validator roster, in rotation order.
    pub validators: Vec<String>,
    /// Increments once per rotation.
    pub epoch: u64,
    pub block_time_ms: u64,
    /// Leading zero digits under PoW; hash-rate scaling factor under PoA.
    pub difficulty: u32,
}

impl ConsensusState {
    /// Default PoA state with the first validator holding authority.
    pub fn new(validators: Vec<String>, block_time_ms: u64, difficulty: u32) -> Self {
        Self {
            mechanism: Mechanism::ProofOfAuthority,
            current_validator: validators.first().cloned().unwrap_or_default(),
            validators,
            epoch: 0,
            block_time_ms,
            difficulty,
        }
    }

    /// Move authority to `next` and bump the epoch.
    pub fn rotate_to(&mut self, next: impl Into<String>) {
        self.current_validator = next.into();
        self.epoch += 1;
    }
}
