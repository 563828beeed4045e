//! Error types for ldpx-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier could not be parsed or names an impossible resource
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Storage-related errors raised by a persistence collaborator
    #[error("Storage error: {0}")]
    Storage(String),

    /// Commit or rollback attempted on a transaction that is no longer open
    #[error("Transaction {0} is not open")]
    TransactionClosed(String),

    /// Write attempted through a read-only transaction
    #[error("Transaction {0} is read-only")]
    ReadOnly(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an invalid identifier error
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Error::InvalidId(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a transaction-closed error
    pub fn transaction_closed(tx_id: impl Into<String>) -> Self {
        Error::TransactionClosed(tx_id.into())
    }

    /// Create a read-only error
    pub fn read_only(tx_id: impl Into<String>) -> Self {
        Error::ReadOnly(tx_id.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
