//! Token balances and stakes
//!
//! All state sits behind one read/write lock. Every mutation holds the write
//! lock until the store has been rewritten, so no reader ever sees a stake
//! change that the ledger file does not also reflect (or is about to).

use crate::{ChainError, Result, TokenAmount};
use parking_lot::RwLock;
use ridechain_core::{LedgerState, LedgerStore, MemoryLedgerStore};
use std::fmt;

/// Balance and stake bookkeeping backed by a durable store
pub struct TokenLedger {
    state: RwLock<LedgerState>,
    store: Box<dyn LedgerStore>,
}

impl fmt::Debug for TokenLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLedger")
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl TokenLedger {
    /// Load the ledger from `store`
    pub fn open(store: Box<dyn LedgerStore>) -> Result<Self> {
        let state = store.load()?;
        Ok(Self {
            state: RwLock::new(state),
            store,
        })
    }

    /// Empty ledger that persists to memory only
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            store: Box::new(MemoryLedgerStore::new()),
        }
    }

    /// Staked amount, 0 for unknown identities
    pub fn stake_of(&self, id: &str) -> TokenAmount {
        self.state.read().stake_of(id)
    }

    /// Spendable balance, 0 for unknown identities
    pub fn balance_of(&self, id: &str) -> TokenAmount {
        self.state.read().balance_of(id)
    }

    /// Copy of the whole ledger
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }

    /// Credit newly issued tokens to a balance (faucet / admin action)
    pub fn mint(&self, id: &str, amount: TokenAmount) -> Result<()> {
        self.mutate(|state| credit_balance(state, id, amount))?;
        tracing::info!(participant = id, amount, "tokens minted");
        Ok(())
    }

    /// Move `amount` from balance to stake
    pub fn stake(&self, id: &str, amount: TokenAmount) -> Result<()> {
        self.mutate(|state| apply_stake(state, id, amount))?;
        tracing::info!(participant = id, amount, "tokens staked");
        Ok(())
    }

    /// Move `amount` from stake back to balance, returning the stake left
    pub fn unstake(&self, id: &str, amount: TokenAmount) -> Result<TokenAmount> {
        let remaining = self.mutate(|state| apply_unstake(state, id, amount))?;
        tracing::info!(participant = id, amount, remaining, "tokens unstaked");
        Ok(remaining)
    }

    /// Rewrite the store from memory, e.g. after a failed flush
    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        self.store.save(&state).map_err(ChainError::Persistence)
    }

    /// Run `f` under the write lock and persist if it succeeds.
    ///
    /// A store failure is returned as `Persistence`; the in-memory change
    /// made by `f` is kept.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut LedgerState) -> Result<R>) -> Result<R> {
        let mut state = self.state.write();
        let outcome = f(&mut state)?;

        if let Err(e) = self.store.save(&state) {
            tracing::warn!(error = %e, "ledger flush failed, memory is ahead of storage");
            return Err(ChainError::Persistence(e));
        }

        Ok(outcome)
    }

    /// Run `f` under the read lock
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        f(&self.state.read())
    }
}

/// Move `amount` from balance to stake inside an already locked state
pub(crate) fn apply_stake(state: &mut LedgerState, id: &str, amount: TokenAmount) -> Result<()> {
    let available = state.balance_of(id);
    if available < amount {
        return Err(ChainError::InsufficientBalance {
            needed: amount,
            available,
        });
    }

    let staked = state
        .stake_of(id)
        .checked_add(amount)
        .ok_or_else(|| ChainError::BalanceOverflow(id.to_string()))?;

    state.balances.insert(id.to_string(), available - amount);
    state.stakes.insert(id.to_string(), staked);
    Ok(())
}

/// Move `amount` from stake to balance inside an already locked state
pub(crate) fn apply_unstake(
    state: &mut LedgerState,
    id: &str,
    amount: TokenAmount,
) -> Result<TokenAmount> {
    let staked = state.stake_of(id);
    if staked < amount {
        return Err(ChainError::InsufficientStake {
            needed: amount,
            available: staked,
        });
    }

    let balance = state
        .balance_of(id)
        .checked_add(amount)
        .ok_or_else(|| ChainError::BalanceOverflow(id.to_string()))?;

    state.stakes.insert(id.to_string(), staked - amount);
    state.balances.insert(id.to_string(), balance);
    Ok(staked - amount)
}

/// Add `amount` to a balance, refusing to wrap or saturate
pub(crate) fn credit_balance(state: &mut LedgerState, id: &str, amount: TokenAmount) -> Result<()> {
    let balance = state
        .balance_of(id)
        .checked_add(amount)
        .ok_or_else(|| ChainError::BalanceOverflow(id.to_string()))?;
    state.balances.insert(id.to_string(), balance);
    Ok(())
}
