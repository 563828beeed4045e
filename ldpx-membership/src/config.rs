//! Configuration file support
//!
//! Loads settings from a TOML file and merges them with environment
//! variables. Membership settings live under `[membership]`, logging
//! settings under `[logging]`.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variables (`LDPX_AUTO_VERSIONING`, `RUST_LOG`, `LOG_LEVEL`, `LOG_FORMAT`)
//! 2. Config file
//! 3. Hardcoded defaults

use crate::error::{MembershipError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable overriding `membership.auto_versioning`
pub const AUTO_VERSIONING_ENV: &str = "LDPX_AUTO_VERSIONING";

// ---------------------------------------------------------------------------
// File config serde types (all Option; absence means "not set in file")
// ---------------------------------------------------------------------------

/// Top-level config file structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LdpxFileConfig {
    /// `[membership]`
    #[serde(default)]
    pub membership: Option<MembershipFileConfig>,

    /// `[logging]`
    #[serde(default)]
    pub logging: Option<LoggingFileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MembershipFileConfig {
    pub auto_versioning: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LoggingFileConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// Read a config file; an empty file yields the defaults
pub fn load_config_file(path: &Path) -> Result<LdpxFileConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| MembershipError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(LdpxFileConfig::default());
    }
    toml::from_str(&content).map_err(|e| MembershipError::ConfigParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Effective membership settings
// ---------------------------------------------------------------------------

/// Settings of the membership service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipConfig {
    /// Every change of a container records a version (default). When off,
    /// versions are created on demand and the head state is part of the
    /// container's history.
    pub auto_versioning: bool,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            auto_versioning: true,
        }
    }
}

impl MembershipConfig {
    /// Defaults overlaid with the file's `[membership]` section
    pub fn from_file_config(file: &LdpxFileConfig) -> Self {
        let mut config = Self::default();
        if let Some(auto) = file.membership.as_ref().and_then(|m| m.auto_versioning) {
            config.auto_versioning = auto;
        }
        config
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(AUTO_VERSIONING_ENV) {
            self.auto_versioning = parse_bool(AUTO_VERSIONING_ENV, &raw)?;
            debug!(auto_versioning = self.auto_versioning, "auto versioning set from environment");
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Load from an optional config file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file_config(&load_config_file(path)?),
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MembershipError::invalid_value(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}
