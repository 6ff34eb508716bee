//! consentctl configuration file.
//!
//! Every field is optional; command-line flags take precedence.
//!
//! ```toml
//! database = "/var/lib/consent/consent.db"
//! log_level = "info"
//!
//! [kernel]
//! extra_categories = ["dental", "vision"]
//! event_channel_capacity = 64
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use consent_kernel::KernelConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE: &str = "consent.db";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// SQLite database path.
    pub database: Option<PathBuf>,
    /// `EnvFilter` directive, e.g. `info` or `consent_kernel=debug`.
    pub log_level: Option<String>,
    pub kernel: KernelConfig,
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line overrides.
    pub fn merge(mut self, database: Option<PathBuf>, log_level: Option<String>) -> Self {
        if database.is_some() {
            self.database = database;
        }
        if log_level.is_some() {
            self.log_level = log_level;
        }
        self
    }

    pub fn database(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}
