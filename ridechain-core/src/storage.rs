//! Durable storage for token balances and stakes
//!
//! The ledger is persisted as a single JSON document that is rewritten in
//! full after every mutation. A missing document is an empty ledger.

use crate::{CoreError, ParticipantId, Result, TokenAmount};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Balances and stakes keyed by participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Spendable tokens
    #[serde(default)]
    pub balances: BTreeMap<ParticipantId, TokenAmount>,
    /// Tokens locked as stake
    #[serde(default)]
    pub stakes: BTreeMap<ParticipantId, TokenAmount>,
}

impl LedgerState {
    /// Balance of a participant, 0 if unknown
    pub fn balance_of(&self, id: &str) -> TokenAmount {
        self.balances.get(id).copied().unwrap_or(0)
    }

    /// Stake of a participant, 0 if unknown
    pub fn stake_of(&self, id: &str) -> TokenAmount {
        self.stakes.get(id).copied().unwrap_or(0)
    }

    /// Sum of all balances and stakes, widened so it cannot overflow
    pub fn total_supply(&self) -> u128 {
        self.balances
            .values()
            .chain(self.stakes.values())
            .map(|amount| u128::from(*amount))
            .sum()
    }
}

/// Where the token ledger is loaded from and flushed to
pub trait LedgerStore: Send + Sync {
    /// Load the ledger, returning an empty state if nothing was saved yet
    fn load(&self) -> Result<LedgerState>;

    /// Overwrite the stored ledger with `state`
    fn save(&self, state: &LedgerState) -> Result<()>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    fn load(&self) -> Result<LedgerState> {
        (**self).load()
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        (**self).save(state)
    }
}

/// JSON file backed ledger store
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<LedgerState> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "ledger file missing, starting empty");
            return Ok(LedgerState::default());
        }

        let data = std::fs::read(&self.path)
            .map_err(|e| CoreError::Storage(format!("Failed to read ledger: {}", e)))?;

        let state: LedgerState = serde_json::from_slice(&data)
            .map_err(|e| CoreError::Storage(format!("Failed to parse ledger: {}", e)))?;

        tracing::debug!(
            path = %self.path.display(),
            accounts = state.balances.len(),
            stakers = state.stakes.len(),
            "ledger loaded"
        );
        Ok(state)
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoreError::Storage(format!("Failed to create ledger directory: {}", e))
                })?;
            }
        }

        std::fs::write(&self.path, data)
            .map_err(|e| CoreError::Storage(format!("Failed to write ledger: {}", e)))
    }
}

/// In-memory ledger store for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    saved: Mutex<Option<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing ledger state
    pub fn with_state(state: LedgerState) -> Self {
        Self {
            saved: Mutex::new(Some(state)),
        }
    }

    /// Last state written by `save`, if any
    pub fn saved(&self) -> Option<LedgerState> {
        self.saved.lock().clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<LedgerState> {
        Ok(self.saved.lock().clone().unwrap_or_default())
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        *self.saved.lock() = Some(state.clone());
        Ok(())
    }
}
