//! Protocol configuration types

use crate::genesis::GenesisConfig;
use anyhow::Context;
use halom_core::error::Result;
use halom_economics::{RebaseConfig, StakingConfig};
use halom_oracle::OracleConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete protocol configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Consensus rounds and feed aggregation
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Supply change bounds and split
    #[serde(default)]
    pub rebase: RebaseConfig,

    /// Staking and delegation
    #[serde(default)]
    pub staking: StakingConfig,

    /// Initial index, accounts and allocations
    #[serde(default)]
    pub genesis: GenesisConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProtocolConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("parsing protocol config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serializing protocol config")
    }

    pub fn validate(&self) -> Result<()> {
        self.oracle.validate()?;
        self.rebase.validate()?;
        self.staking.validate()?;
        self.genesis.validate()?;
        Ok(())
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Color output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            color: true,
        }
    }
}
