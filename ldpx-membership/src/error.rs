//! Error types for the membership crate

use std::path::PathBuf;
use thiserror::Error;

/// Result type for membership operations
pub type Result<T> = std::result::Result<T, MembershipError>;

/// Errors that can occur while deriving or querying membership
#[derive(Error, Debug)]
pub enum MembershipError {
    /// Core error wrapper (reader, lister and index failures)
    #[error("Core error: {0}")]
    Core(#[from] ldpx_core::Error),

    /// Direct or indirect container with an unusable configuration
    #[error("Invalid membership configuration for {container}: {detail}")]
    Config { container: String, detail: String },

    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// Invalid config value from the environment
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

impl MembershipError {
    /// Create a container configuration error
    pub fn config(container: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Config {
            container: container.into(),
            detail: detail.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}
