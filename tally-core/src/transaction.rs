//! Ledger transactions.
//!
//! A transaction records one election-related action (a vote, an election
//! lifecycle change, a voter registration or a contract invocation). It is
//! created pending, waits in the pool, and is either confirmed into a block or
//! failed. Both transitions are final.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{hash, Hash};
use crate::error::{Error, Result};

/// Unique identifier of a transaction (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id counts as absent.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of action a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Vote,
    ElectionCreate,
    ElectionUpdate,
    VoterRegister,
    SmartContract,
}

impl TxKind {
    /// All kinds, in batch priority order.
    pub const ALL: [TxKind; 5] = [
        TxKind::Vote,
        TxKind::SmartContract,
        TxKind::ElectionUpdate,
        TxKind::ElectionCreate,
        TxKind::VoterRegister,
    ];

    /// Gas budget assigned to a transaction of this kind.
    pub fn gas_limit(self) -> u64 {
        match self {
            TxKind::Vote => 100,
            TxKind::ElectionCreate => 500,
            TxKind::ElectionUpdate => 300,
            TxKind::VoterRegister => 200,
            TxKind::SmartContract => 1000,
        }
    }

    /// Batch priority (lower is processed first).
    pub fn priority(self) -> u8 {
        match self {
            TxKind::Vote => 1,
            TxKind::SmartContract => 2,
            TxKind::ElectionUpdate => 3,
            TxKind::ElectionCreate => 4,
            TxKind::VoterRegister => 5,
        }
    }

    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Vote => "vote",
            TxKind::ElectionCreate => "election_create",
            TxKind::ElectionUpdate => "election_update",
            TxKind::VoterRegister => "voter_register",
            TxKind::SmartContract => "smart_contract",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TxKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::invalid_transaction(format!("unknown transaction type: {s}")))
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub from: String,
    pub to: Option<String>,
    pub data: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub signature: Hash,
    pub status: TxStatus,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub block_index: Option<u64>,
}

/// Fields covered by the signature.
#[derive(Serialize)]
struct SignableTransaction<'a> {
    id: &'a str,
    kind: &'a str,
    from: &'a str,
    to: Option<&'a str>,
    data: String,
    timestamp: i64,
}

impl Transaction {
    /// Create a signed, pending transaction. It is not enqueued anywhere.
    pub fn new(kind: TxKind, from: impl Into<String>, data: Value, to: Option<String>) -> Self {
        Self::with_timestamp(kind, from, data, to, crate::now())
    }

    /// Create a signed, pending transaction with an explicit creation time.
    pub fn with_timestamp(
        kind: TxKind,
        from: impl Into<String>,
        data: Value,
        to: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self {
            id: TxId::generate(),
            kind,
            from: from.into(),
            to,
            data,
            timestamp,
            signature: Hash::ZERO,
            status: TxStatus::Pending,
            gas_limit: kind.gas_limit(),
            gas_used: 0,
            block_index: None,
        };
        tx.signature = tx.compute_signature();
        tx
    }

    /// Canonical bytes over `{id, type, from, to, data, timestamp}`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let signable = SignableTransaction {
            id: self.id.as_str(),
            kind: self.kind.as_str(),
            from: &self.from,
            to: self.to.as_deref(),
            data: self.data.to_string(),
            timestamp: self.timestamp.timestamp_millis(),
        };
        bincode::serialize(&signable).expect("serialization should not fail")
    }

    /// Recompute the digest the signature must equal.
    pub fn compute_signature(&self) -> Hash {
        hash(&self.canonical_bytes())
    }

    /// Check the stored signature against the canonical fields.
    pub fn verify_signature(&self) -> bool {
        !self.signature.is_zero() && self.signature == self.compute_signature()
    }

    /// Check if the transaction is still pending.
    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending
    }

    /// Transition pending → confirmed. Returns false if already final.
    pub fn confirm(&mut self, block_index: u64, gas_used: u64) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = TxStatus::Confirmed;
        self.block_index = Some(block_index);
        self.gas_used = gas_used;
        true
    }

    /// Transition pending → failed. Returns false if already final.
    pub fn fail(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = TxStatus::Failed;
        true
    }

    /// Admission checks: required fields and signature present.
    ///
    /// The signature is not recomputed here; see [`Self::verify_signature`].
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_transaction("missing id"));
        }
        if self.signature.is_zero() {
            return Err(Error::invalid_transaction("missing signature"));
        }
        if self.from.trim().is_empty() {
            return Err(Error::invalid_transaction("missing sender"));
        }
        if self.data.is_null() {
            return Err(Error::invalid_transaction("missing payload"));
        }
        Ok(())
    }
}
