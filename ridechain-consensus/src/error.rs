//! Error types for the ride ledger

use crate::{ParticipantId, TokenAmount, TxId};
use ridechain_core::{CoreError, RideStage, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid ride transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ride transaction not found: {0}")]
    TransactionNotFound(TxId),

    #[error("No pending verification for driver {0}")]
    NoPendingVerification(ParticipantId),

    #[error("Unauthorized: {0} is not a validator")]
    Unauthorized(ParticipantId),

    #[error("{0} is not a validator")]
    NotAValidator(ParticipantId),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: TokenAmount, available: TokenAmount },

    #[error("Insufficient stake: need {needed}, have {available}")]
    InsufficientStake { needed: TokenAmount, available: TokenAmount },

    #[error("Validator {0} has no stake to slash")]
    NothingToSlash(ParticipantId),

    #[error("Token amount overflow for {0}")]
    BalanceOverflow(ParticipantId),

    #[error("Ride {tx_id} is already {stage}")]
    AlreadyConfirmed { tx_id: TxId, stage: RideStage },

    #[error("Pickup not confirmed for ride {0}")]
    PickupNotConfirmed(TxId),

    #[error("Dropoff not confirmed for ride {0}")]
    DropoffNotConfirmed(TxId),

    #[error("Verification for driver {0} already requested")]
    AlreadyRequested(ParticipantId),

    #[error("Validator {validator} already approved ride {tx_id}")]
    DuplicateApproval { tx_id: TxId, validator: ParticipantId },

    #[error("Ride {0} was already submitted")]
    DuplicateTransaction(TxId),

    #[error("Driver {0} has not been verified")]
    DriverNotVerified(ParticipantId),

    #[error("Invalid pickup code for ride {0}")]
    InvalidPickupCode(TxId),

    #[error("Ledger persistence failed: {0}")]
    Persistence(CoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl ChainError {
    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChainError::Validation(_) => ErrorCategory::Validation,
            ChainError::TransactionNotFound(_) | ChainError::NoPendingVerification(_) => {
                ErrorCategory::NotFound
            }
            ChainError::Unauthorized(_)
            | ChainError::NotAValidator(_)
            | ChainError::DriverNotVerified(_) => ErrorCategory::Authorization,
            ChainError::InsufficientBalance { .. }
            | ChainError::InsufficientStake { .. }
            | ChainError::NothingToSlash(_)
            | ChainError::BalanceOverflow(_) => ErrorCategory::Economic,
            ChainError::AlreadyConfirmed { .. }
            | ChainError::PickupNotConfirmed(_)
            | ChainError::DropoffNotConfirmed(_)
            | ChainError::AlreadyRequested(_)
            | ChainError::DuplicateApproval { .. }
            | ChainError::DuplicateTransaction(_) => ErrorCategory::Ordering,
            ChainError::InvalidPickupCode(_) => ErrorCategory::Proof,
            ChainError::Persistence(_) | ChainError::Core(_) => ErrorCategory::Persistence,
            ChainError::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether the in-memory mutation went through even though the call failed
    pub fn is_applied_in_memory(&self) -> bool {
        matches!(self, ChainError::Persistence(_))
    }
}

/// Ledger error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Authorization,
    Economic,
    Ordering,
    Proof,
    Persistence,
    Configuration,
}
