//! Configuration for a RideChain instance

use crate::{constants, ChainError, Result, TokenAmount};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// RideChain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Token ledger document
    pub ledger_path: PathBuf,
    /// Distinct validator approvals needed to commit a ride
    pub approval_quorum: usize,
    /// Stake required of every validator after the genesis validator
    pub min_validator_stake: TokenAmount,
    /// Forward clock skew tolerated on ride requests, in seconds
    pub max_request_skew_secs: i64,
    /// Reject rides from drivers without an approved verification
    pub require_verified_drivers: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ledger_path: Self::default_ledger_path(),
            approval_quorum: constants::DEFAULT_APPROVAL_QUORUM,
            min_validator_stake: constants::MIN_VALIDATOR_STAKE,
            max_request_skew_secs: constants::MAX_REQUEST_SKEW_SECS,
            require_verified_drivers: false,
        }
    }
}

impl ChainConfig {
    /// Ledger file under the platform data directory, or `data/` if there is none
    pub fn default_ledger_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("ridechain").join("token_ledger.json"))
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_LEDGER_FILE))
    }

    /// Configuration with the given ledger file and defaults elsewhere
    pub fn with_ledger_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ledger_path: path.into(),
            ..Self::default()
        }
    }

    /// Create configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            ChainError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&config_str).map_err(|e| {
                ChainError::Configuration(format!("Failed to parse TOML config: {}", e))
            })?
        } else {
            serde_json::from_str(&config_str).map_err(|e| {
                ChainError::Configuration(format!("Failed to parse JSON config: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let config_str = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::to_string_pretty(self).map_err(|e| {
                ChainError::Configuration(format!("Failed to serialize config as TOML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                ChainError::Configuration(format!("Failed to serialize config as JSON: {}", e))
            })?
        };

        std::fs::write(path, config_str).map_err(|e| {
            ChainError::Configuration(format!("Failed to write config file: {}", e))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.approval_quorum == 0 {
            return Err(ChainError::Configuration(
                "Approval quorum cannot be zero".to_string(),
            ));
        }

        if self.max_request_skew_secs < 0 {
            return Err(ChainError::Configuration(
                "Request skew tolerance cannot be negative".to_string(),
            ));
        }

        if self.ledger_path.as_os_str().is_empty() {
            return Err(ChainError::Configuration(
                "Ledger path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Skew tolerance as a duration
    pub fn max_request_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_request_skew_secs)
    }
}
