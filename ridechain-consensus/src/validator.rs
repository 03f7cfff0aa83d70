//! Validator membership, staking thresholds and slashing

use crate::ledger::{apply_unstake, credit_balance, TokenLedger};
use crate::{ChainError, ParticipantId, Result, TokenAmount};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Record of a validator being slashed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    /// Validator that lost stake
    pub validator: ParticipantId,

    /// Validator that reported the misbehavior
    pub slasher: ParticipantId,

    pub reason: String,

    /// Stake burned
    pub slashed_amount: TokenAmount,

    /// Stake the validator kept
    pub remaining_stake: TokenAmount,

    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ValidatorSet {
    members: BTreeSet<ParticipantId>,
    /// Identity admitted while the set was empty
    genesis: Option<ParticipantId>,
    history: Vec<SlashRecord>,
}

/// Set of identities allowed to approve rides.
///
/// Operations that also touch the token ledger take the ledger lock first
/// and this set's lock second.
#[derive(Debug)]
pub struct ValidatorRegistry {
    set: RwLock<ValidatorSet>,
    min_stake: TokenAmount,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new(min_stake: TokenAmount) -> Self {
        Self {
            set: RwLock::new(ValidatorSet::default()),
            min_stake,
        }
    }

    /// Stake required after the genesis validator
    pub fn min_stake(&self) -> TokenAmount {
        self.min_stake
    }

    pub fn is_validator(&self, id: &str) -> bool {
        self.set.read().members.contains(id)
    }

    /// Current validators in identity order
    pub fn validators(&self) -> Vec<ParticipantId> {
        self.set.read().members.iter().cloned().collect()
    }

    pub fn validator_count(&self) -> usize {
        self.set.read().members.len()
    }

    pub fn genesis_validator(&self) -> Option<ParticipantId> {
        self.set.read().genesis.clone()
    }

    /// Every slash applied so far, oldest first
    pub fn slash_history(&self) -> Vec<SlashRecord> {
        self.set.read().history.clone()
    }

    /// Admit `id` as a validator.
    ///
    /// The first validator of an empty set is admitted regardless of stake;
    /// everyone else needs at least the minimum stake. Admitting an existing
    /// validator again is a no-op.
    pub fn become_validator(&self, ledger: &TokenLedger, id: &str) -> Result<()> {
        ledger.inspect(|state| {
            let mut set = self.set.write();

            if set.members.contains(id) {
                return Ok(());
            }

            if set.members.is_empty() {
                if let Some(previous) = &set.genesis {
                    tracing::warn!(previous = %previous, "validator set emptied, bootstrapping again");
                }
                set.members.insert(id.to_string());
                set.genesis = Some(id.to_string());
                tracing::info!(validator = id, "let there be light! genesis validator created");
                return Ok(());
            }

            let stake = state.stake_of(id);
            if stake < self.min_stake {
                return Err(ChainError::InsufficientStake {
                    needed: self.min_stake,
                    available: stake,
                });
            }

            set.members.insert(id.to_string());
            tracing::info!(validator = id, stake, "became a validator");
            Ok(())
        })
    }

    /// Halve the stake of `id` and revoke its validator status.
    ///
    /// The burned half is removed from circulation. The ledger stays write
    /// locked until the new stake has been persisted.
    pub fn slash(
        &self,
        ledger: &TokenLedger,
        id: &str,
        slasher: &str,
        reason: &str,
    ) -> Result<SlashRecord> {
        ledger.mutate(|state| {
            let mut set = self.set.write();

            if !set.members.contains(slasher) {
                return Err(ChainError::Unauthorized(slasher.to_string()));
            }

            if !set.members.contains(id) {
                return Err(ChainError::NotAValidator(id.to_string()));
            }

            let stake = state.stake_of(id);
            if stake == 0 {
                return Err(ChainError::NothingToSlash(id.to_string()));
            }

            let slashed_amount = stake / 2;
            let remaining_stake = stake - slashed_amount;
            state.stakes.insert(id.to_string(), remaining_stake);
            set.members.remove(id);

            let record = SlashRecord {
                validator: id.to_string(),
                slasher: slasher.to_string(),
                reason: reason.to_string(),
                slashed_amount,
                remaining_stake,
                timestamp: Utc::now(),
            };
            set.history.push(record.clone());

            tracing::warn!(
                validator = id,
                slasher,
                slashed_amount,
                reason,
                "validator slashed and removed from validators"
            );
            Ok(record)
        })
    }

    /// Credit `amount` to a validator's balance
    pub fn reward(&self, ledger: &TokenLedger, id: &str, amount: TokenAmount) -> Result<()> {
        ledger.mutate(|state| {
            if !self.set.read().members.contains(id) {
                return Err(ChainError::NotAValidator(id.to_string()));
            }

            credit_balance(state, id, amount)
        })?;
        tracing::info!(validator = id, amount, "validator rewarded");
        Ok(())
    }

    /// Unstake tokens, revoking validator status of a non-genesis validator
    /// whose remaining stake falls below the minimum. Returns the stake left.
    pub fn unstake(&self, ledger: &TokenLedger, id: &str, amount: TokenAmount) -> Result<TokenAmount> {
        ledger.mutate(|state| {
            let remaining = apply_unstake(state, id, amount)?;

            let mut set = self.set.write();
            let is_genesis = set.genesis.as_deref() == Some(id);
            if remaining < self.min_stake && !is_genesis && set.members.remove(id) {
                tracing::info!(validator = id, remaining, "stake below minimum, validator status revoked");
            }

            tracing::info!(participant = id, amount, remaining, "tokens unstaked");
            Ok(remaining)
        })
    }
}
