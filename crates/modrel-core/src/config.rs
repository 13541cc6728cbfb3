//! Tool configuration.
//!
//! Defaults cover the usual monorepo layout. An optional TOML file can
//! override them, and `MODREL_*` environment variables override the file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ReleaseError, Result};
use crate::retry::RetryPolicy;

/// Default file name looked up in the repository root.
pub const DEFAULT_CONFIG_FILE: &str = "modrel.toml";

/// Release tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Top-level directories that hold modules.
    pub type_prefixes: Vec<String>,
    /// Git remote tags are pushed to.
    pub remote: String,
    /// Maximum number of modules processed concurrently.
    pub max_parallel: usize,
    /// Retry policy for individual external calls.
    pub retry: RetryPolicy,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            type_prefixes: vec![
                "helpers".to_string(),
                "resources".to_string(),
                "services".to_string(),
            ],
            remote: "origin".to_string(),
            max_parallel: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReleaseConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ReleaseError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise use defaults. Environment
    /// overrides are applied in both cases.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            debug!(path = %path.display(), "loading config file");
            let raw = std::fs::read_to_string(path)?;
            Self::from_toml_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MODREL_*` overrides from the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefixes) = lookup("MODREL_TYPE_PREFIXES") {
            self.type_prefixes = prefixes
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(remote) = lookup("MODREL_REMOTE") {
            self.remote = remote;
        }
        if let Some(raw) = lookup("MODREL_MAX_PARALLEL") {
            self.max_parallel = raw
                .parse()
                .map_err(|_| ReleaseError::Config(format!("MODREL_MAX_PARALLEL: '{raw}'")))?;
        }
        if let Some(raw) = lookup("MODREL_MAX_RETRIES") {
            self.retry.max_retries = raw
                .parse()
                .map_err(|_| ReleaseError::Config(format!("MODREL_MAX_RETRIES: '{raw}'")))?;
        }
        Ok(())
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.type_prefixes.is_empty() {
            return Err(ReleaseError::Config("type_prefixes must not be empty".into()));
        }
        if self.max_parallel == 0 {
            return Err(ReleaseError::Config("max_parallel must be at least 1".into()));
        }
        Ok(())
    }
}
