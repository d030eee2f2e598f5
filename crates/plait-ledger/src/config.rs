//! Ledger configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger configuration: the local user and the genesis balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The account this node signs transactions from.
    pub user: UserConfig,
    /// Accounts funded in the genesis block.
    #[serde(default)]
    pub initial_accounts: Vec<InitialAccount>,
}

/// The local user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Account address.
    pub address: String,
}

/// One account funded at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialAccount {
    /// Account address.
    pub address: String,
    /// Starting balance.
    pub balance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: UserConfig {
                address: "node-0".to_string(),
            },
            initial_accounts: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user.address.is_empty() {
            return Err(ConfigError::InvalidValue(
                "user address cannot be empty".to_string(),
            ));
        }

        for account in &self.initial_accounts {
            if account.address.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "initial account address cannot be empty".to_string(),
                ));
            }
            if account.balance < 0.0 || !account.balance.is_finite() {
                return Err(ConfigError::InvalidValue(format!(
                    "initial balance for {} must be a non-negative number",
                    account.address
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
