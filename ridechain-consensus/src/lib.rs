//! RideChain Consensus - staking, slashing and quorum approval of rides
//!
//! Drivers stake tokens to become validators, rides move through pickup and
//! dropoff proofs while pending, and a ride is committed to the permanent
//! ledger once enough distinct validators approve it. Everything runs in a
//! single process; "consensus" here is a configurable approval count.

pub mod chain;
pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod transaction;
pub mod validator;
pub mod verification;

pub use chain::RideChain;
pub use config::ChainConfig;
pub use consensus::{ApprovalOutcome, QuorumPolicy};
pub use error::{ChainError, ErrorCategory};
pub use ledger::TokenLedger;
pub use transaction::{CommittedLedger, RidePool};
pub use validator::{SlashRecord, ValidatorRegistry};
pub use verification::{DriverVerificationRequest, VerificationAudit, VerificationDesk, VerificationStatus};

pub use ridechain_core::{ParticipantId, TokenAmount, TxId};

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Network configuration constants
pub mod constants {
    use super::TokenAmount;

    /// Minimum stake for every validator after the genesis validator
    pub const MIN_VALIDATOR_STAKE: TokenAmount = 10;

    /// Approvals needed to commit a ride while only the genesis validator exists
    pub const DEFAULT_APPROVAL_QUORUM: usize = 1;

    /// How far a ride request may be stamped in the future (seconds)
    pub const MAX_REQUEST_SKEW_SECS: i64 = 180;

    /// Default ledger file, relative to the working directory
    pub const DEFAULT_LEDGER_FILE: &str = "data/token_ledger.json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quorum_admits_genesis_alone() {
        assert!(constants::DEFAULT_APPROVAL_QUORUM >= 1);
    }
}
