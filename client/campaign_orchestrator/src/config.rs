use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::DEFAULT_DECIMALS;

pub const DEFAULT_CONFIG_FILE: &str = "crowdfund.toml";

/// Ledger the orchestrator talks to, chosen once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// In-process ledger whose journal persists in the data directory.
    Sandbox,
    /// In-process ledger that starts empty and is discarded on exit.
    Ephemeral,
}

impl Network {
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Sandbox => "Crowdfund Sandbox Ledger ; March 2024",
            Network::Ephemeral => "Crowdfund Ephemeral Ledger ; March 2024",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub network: Network,
    pub data_dir: PathBuf,
    pub confirm_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_submit_attempts: u32,
    pub decimals: u32,
    pub precheck: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Sandbox,
            data_dir: PathBuf::from(".crowdfund"),
            confirm_timeout_ms: 30_000,
            poll_interval_ms: 250,
            max_submit_attempts: 3,
            decimals: DEFAULT_DECIMALS,
            precheck: true,
        }
    }
}

/// Timing and retry knobs for one orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitSettings {
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub precheck: bool,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Config::default().submit_settings()
    }
}

impl Config {
    /// Read `path`, or `crowdfund.toml` in the working directory if present,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirm_timeout_ms == 0 {
            return Err(ConfigError::Invalid("confirm_timeout_ms must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.max_submit_attempts == 0 {
            return Err(ConfigError::Invalid("max_submit_attempts must be at least 1".into()));
        }
        if self.decimals > 18 {
            return Err(ConfigError::Invalid("decimals must be at most 18".into()));
        }
        Ok(())
    }

    pub fn submit_settings(&self) -> SubmitSettings {
        SubmitSettings {
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_submit_attempts,
            precheck: self.precheck,
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.jsonl")
    }

    pub fn keyring_path(&self) -> PathBuf {
        self.data_dir.join("keyring.json")
    }
}
