//! Error types for Tally.
//!
//! Provides structured errors with:
//! - Unique error codes for reporting
//! - Source error chaining
//! - Client vs server error categorization

use std::io;
use thiserror::Error;

/// Result type for Tally operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes.
///
/// Codes are structured as:
/// - 1xxx: Validation errors (client)
/// - 2xxx: Not found errors (client)
/// - 3xxx: Conflict and capacity errors (client)
/// - 4xxx: Execution errors (rule engine, mining)
/// - 5xxx: Storage errors (server)
/// - 6xxx: Internal errors (server)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidHash = 1001,
    InvalidTransaction = 1002,
    InvalidBlock = 1003,
    InvalidContract = 1004,

    // Not found errors (2xxx)
    NodeNotFound = 2003,
    ContractNotFound = 2004,

    // Conflict and capacity errors (3xxx)
    DuplicateTransaction = 3001,
    PoolFull = 3002,
    ChainNotInitialized = 3003,

    // Execution errors (4xxx)
    ContractExecution = 4001,
    ContractInactive = 4002,
    PowTimeout = 4003,

    // Storage errors (5xxx)
    StorageRead = 5001,
    StorageWrite = 5002,

    // Internal errors (6xxx)
    Serialization = 6001,
}

impl ErrorCode {
    /// Get the numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Check if this is a client error.
    pub fn is_client_error(self) -> bool {
        (1000..5000).contains(&self.code())
    }

    /// Check if this is a server error.
    pub fn is_server_error(self) -> bool {
        self.code() >= 5000
    }

    /// Check if the failed operation may succeed when retried unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::StorageRead | ErrorCode::StorageWrite | ErrorCode::PoolFull | ErrorCode::PowTimeout
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Errors that can occur in Tally.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Invalid hash format or value.
    #[error("[{code}] invalid hash: {message}")]
    InvalidHash {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction failed admission checks.
    #[error("[{code}] invalid transaction: {message}")]
    InvalidTransaction { code: ErrorCode, message: String },

    /// Block failed an integrity check (linkage, hash, merkle root, signature).
    #[error("[{code}] invalid block {index}: {message}")]
    InvalidBlock {
        code: ErrorCode,
        index: u64,
        message: String,
    },

    /// Contract definition is malformed.
    #[error("[{code}] invalid contract: {message}")]
    InvalidContract { code: ErrorCode, message: String },

    // ========================================================================
    // Not Found Errors
    // ========================================================================
    /// Item not found.
    #[error("[{code}] not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    // ========================================================================
    // Conflict / Capacity Errors
    // ========================================================================
    /// Duplicate item.
    #[error("[{code}] duplicate: {message}")]
    Duplicate { code: ErrorCode, message: String },

    /// The transaction pool is at capacity.
    #[error("[{code}] transaction pool full ({capacity} entries)")]
    PoolFull { code: ErrorCode, capacity: usize },

    /// The chain has no genesis block yet.
    #[error("[{code}] chain not initialized")]
    NotInitialized { code: ErrorCode },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// A contract rule failed while executing.
    #[error("[{code}] contract execution failed: {message}")]
    ContractExecution { code: ErrorCode, message: String },

    /// The contract exists but has been deactivated.
    #[error("[{code}] contract {id} is inactive")]
    ContractInactive { code: ErrorCode, id: String },

    /// Proof-of-work nonce search exhausted its iteration budget.
    #[error("[{code}] proof-of-work gave up after {iterations} iterations at difficulty {difficulty}")]
    PowTimeout {
        code: ErrorCode,
        iterations: u64,
        difficulty: u32,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Storage operation failed.
    #[error("[{code}] storage error: {message}")]
    Storage {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// Serialization/deserialization failed.
    #[error("[{code}] serialization error: {message}")]
    Serialization {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidHash { code, .. } => *code,
            Error::InvalidTransaction { code, .. } => *code,
            Error::InvalidBlock { code, .. } => *code,
            Error::InvalidContract { code, .. } => *code,
            Error::NotFound { code, .. } => *code,
            Error::Duplicate { code, .. } => *code,
            Error::PoolFull { code, .. } => *code,
            Error::NotInitialized { code } => *code,
            Error::ContractExecution { code, .. } => *code,
            Error::ContractInactive { code, .. } => *code,
            Error::PowTimeout { code, .. } => *code,
            Error::Storage { code, .. } => *code,
            Error::Serialization { code, .. } => *code,
        }
    }

    /// Check if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.code().is_client_error()
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        self.code().is_server_error()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl Error {
    /// Create an InvalidHash error.
    pub fn invalid_hash(message: impl Into<String>) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: message.into(),
            source: None,
        }
    }

    /// Create an InvalidTransaction error.
    pub fn invalid_transaction(message: impl Into<String>) -> Self {
        Error::InvalidTransaction {
            code: ErrorCode::InvalidTransaction,
            message: message.into(),
        }
    }

    /// Create an InvalidBlock error for the block at `index`.
    pub fn invalid_block(index: u64, message: impl Into<String>) -> Self {
        Error::InvalidBlock {
            code: ErrorCode::InvalidBlock,
            index,
            message: message.into(),
        }
    }

    /// Create an InvalidContract error.
    pub fn invalid_contract(message: impl Into<String>) -> Self {
        Error::InvalidContract {
            code: ErrorCode::InvalidContract,
            message: message.into(),
        }
    }

    /// Create a NotFound error for nodes.
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            code: ErrorCode::NodeNotFound,
            message: id.into(),
        }
    }

    /// Create a NotFound error for contracts.
    pub fn contract_not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            code: ErrorCode::ContractNotFound,
            message: message.into(),
        }
    }

    /// Create a Duplicate error.
    pub fn duplicate(message: impl Into<String>) -> Self {
        Error::Duplicate {
            code: ErrorCode::DuplicateTransaction,
            message: message.into(),
        }
    }

    /// Create a PoolFull error.
    pub fn pool_full(capacity: usize) -> Self {
        Error::PoolFull {
            code: ErrorCode::PoolFull,
            capacity,
        }
    }

    /// Create a NotInitialized error.
    pub fn not_initialized() -> Self {
        Error::NotInitialized {
            code: ErrorCode::ChainNotInitialized,
        }
    }

    /// Create a ContractExecution error.
    pub fn contract_execution(message: impl Into<String>) -> Self {
        Error::ContractExecution {
            code: ErrorCode::ContractExecution,
            message: message.into(),
        }
    }

    /// Create a ContractInactive error.
    pub fn contract_inactive(id: impl Into<String>) -> Self {
        Error::ContractInactive {
            code: ErrorCode::ContractInactive,
            id: id.into(),
        }
    }

    /// Create a PowTimeout error.
    pub fn pow_timeout(iterations: u64, difficulty: u32) -> Self {
        Error::PowTimeout {
            code: ErrorCode::PowTimeout,
            iterations,
            difficulty,
        }
    }

    /// Create a storage read error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageRead,
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage write error.
    pub fn storage_write(message: impl Into<String>) -> Self {
        Error::Storage {
            code: ErrorCode::StorageWrite,
            message: message.into(),
            source: None,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            code: ErrorCode::Serialization,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Storage {
            code: ErrorCode::StorageRead,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}
