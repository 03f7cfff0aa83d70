//! RideChain: the ledger facade
//!
//! Owns the token ledger, validator registry, pending pool, committed ledger
//! and verification desk of one ledger instance. All operations take `&self`
//! and are safe to call from many threads.

use crate::config::ChainConfig;
use crate::consensus::{ApprovalOutcome, QuorumPolicy};
use crate::ledger::TokenLedger;
use crate::transaction::{CommittedLedger, RidePool};
use crate::validator::{SlashRecord, ValidatorRegistry};
use crate::verification::{DriverVerificationRequest, VerificationAudit, VerificationDesk};
use crate::{ChainError, ParticipantId, Result, TokenAmount, TxId};
use chrono::Utc;
use ridechain_core::{
    FileLedgerStore, LatLng, LedgerState, LedgerStore, MemoryLedgerStore, RideEventKind,
    RideStage, RideTransaction, ValidationError,
};

/// A permissioned proof-of-stake ride ledger
#[derive(Debug)]
pub struct RideChain {
    config: ChainConfig,
    ledger: TokenLedger,
    validators: ValidatorRegistry,
    pool: RidePool,
    committed: CommittedLedger,
    verifications: VerificationDesk,
    quorum: QuorumPolicy,
}

impl RideChain {
    /// Open a ledger persisted to `config.ledger_path`
    pub fn new(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        let store = FileLedgerStore::new(&config.ledger_path);
        Self::with_store(config, Box::new(store))
    }

    /// Open a ledger backed by an arbitrary store
    pub fn with_store(config: ChainConfig, store: Box<dyn LedgerStore>) -> Result<Self> {
        config.validate()?;
        let ledger = TokenLedger::open(store)?;

        tracing::info!(
            quorum = config.approval_quorum,
            min_validator_stake = config.min_validator_stake,
            "ride ledger opened"
        );

        Ok(Self {
            validators: ValidatorRegistry::new(config.min_validator_stake),
            quorum: QuorumPolicy::new(config.approval_quorum),
            ledger,
            pool: RidePool::new(),
            committed: CommittedLedger::new(),
            verifications: VerificationDesk::new(),
            config,
        })
    }

    /// Ledger that never touches the filesystem
    pub fn in_memory(config: ChainConfig) -> Result<Self> {
        Self::with_store(config, Box::new(MemoryLedgerStore::new()))
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    // Tokens and validators

    /// Credit tokens to a participant's balance
    pub fn mint_tokens(&self, id: &str, amount: TokenAmount) -> Result<()> {
        self.ledger.mint(id, amount)
    }

    pub fn stake_tokens(&self, id: &str, amount: TokenAmount) -> Result<()> {
        self.ledger.stake(id, amount)
    }

    /// Move stake back to the balance. A non-genesis validator that drops
    /// below the minimum stake loses its validator status.
    pub fn unstake_tokens(&self, id: &str, amount: TokenAmount) -> Result<TokenAmount> {
        self.validators.unstake(&self.ledger, id, amount)
    }

    pub fn driver_stake(&self, id: &str) -> TokenAmount {
        self.ledger.stake_of(id)
    }

    pub fn driver_balance(&self, id: &str) -> TokenAmount {
        self.ledger.balance_of(id)
    }

    pub fn become_validator(&self, id: &str) -> Result<()> {
        self.validators.become_validator(&self.ledger, id)
    }

    pub fn is_validator(&self, id: &str) -> bool {
        self.validators.is_validator(id)
    }

    pub fn validators(&self) -> Vec<ParticipantId> {
        self.validators.validators()
    }

    pub fn genesis_validator(&self) -> Option<ParticipantId> {
        self.validators.genesis_validator()
    }

    /// Halve a validator's stake and remove it from the validator set
    pub fn slash_validator(&self, id: &str, slasher: &str, reason: &str) -> Result<SlashRecord> {
        self.validators.slash(&self.ledger, id, slasher, reason)
    }

    pub fn slash_history(&self) -> Vec<SlashRecord> {
        self.validators.slash_history()
    }

    pub fn reward_validator(&self, id: &str, amount: TokenAmount) -> Result<()> {
        self.validators.reward(&self.ledger, id, amount)
    }

    pub fn ledger_snapshot(&self) -> LedgerState {
        self.ledger.snapshot()
    }

    /// Write the in-memory ledger to the store again
    pub fn flush_ledger(&self) -> Result<()> {
        self.ledger.flush()
    }

    // Ride lifecycle

    /// Validate a ride, assign its ID and add it to the pending pool.
    ///
    /// Returns the ride as stored.
    pub fn submit_ride_tx(&self, mut ride: RideTransaction) -> Result<RideTransaction> {
        let now = Utc::now();
        ride.validate(now, self.config.max_request_skew())?;

        if self.config.require_verified_drivers && !self.verifications.is_verified(&ride.driver_id) {
            return Err(ChainError::DriverNotVerified(ride.driver_id));
        }

        ride.submitted_at = Some(now);
        let tx_id = ride.content_hash()?;
        ride.tx_id = Some(tx_id.clone());

        if self.committed.contains(&tx_id) {
            return Err(ChainError::DuplicateTransaction(tx_id));
        }
        self.pool.insert(ride.clone())?;

        // A commit of the same ID may have finished between the check and the insert
        if self.committed.contains(&tx_id) {
            self.pool.remove(&tx_id);
            return Err(ChainError::DuplicateTransaction(tx_id));
        }

        tracing::info!(
            tx_id = %tx_id,
            driver = %ride.driver_id,
            rider = %ride.rider_id,
            paid = ride.paid_amount,
            "ride submitted"
        );
        Ok(ride)
    }

    /// Confirm pickup with the code the rider handed the driver
    pub fn submit_pickup_proof(&self, tx_id: &str, code: &str) -> Result<RideTransaction> {
        self.pool.with_ride(tx_id, |entry| {
            let ride = entry.ride();
            if ride.pickup_confirmed {
                return Err(ChainError::AlreadyConfirmed {
                    tx_id: tx_id.to_string(),
                    stage: ride.stage(),
                });
            }

            if ride.pickup_code != code {
                tracing::warn!(tx_id, "pickup proof with wrong code");
                return Err(ChainError::InvalidPickupCode(tx_id.to_string()));
            }

            let mut updated = ride.clone();
            updated.pickup_confirmed = true;
            updated.pickup_at = Some(Utc::now());
            updated.record(RideEventKind::PickupVerified);
            entry.replace(updated)?;

            tracing::info!(tx_id, "pickup confirmed");
            Ok(entry.ride().clone())
        })
    }

    /// Record where the ride actually ended
    pub fn submit_dropoff(&self, tx_id: &str, location: LatLng) -> Result<RideTransaction> {
        self.pool.with_ride(tx_id, |entry| {
            let ride = entry.ride();
            match ride.stage() {
                RideStage::Submitted => {
                    return Err(ChainError::PickupNotConfirmed(tx_id.to_string()));
                }
                RideStage::DropoffConfirmed => {
                    return Err(ChainError::AlreadyConfirmed {
                        tx_id: tx_id.to_string(),
                        stage: RideStage::DropoffConfirmed,
                    });
                }
                RideStage::PickupConfirmed => {}
            }

            if !location.is_valid() {
                return Err(ChainError::Validation(ValidationError::MissingDropoffLocation));
            }

            let mut updated = ride.clone();
            updated.dropoff_location = Some(location);
            updated.dropoff_at = Some(Utc::now());
            updated.dropoff_confirmed = true;
            updated.record(RideEventKind::DropoffConfirmed);
            entry.replace(updated)?;

            tracing::info!(tx_id, lat = location.lat, lng = location.lng, "dropoff confirmed");
            Ok(entry.ride().clone())
        })
    }

    /// Approve a dropped-off ride as `validator`, committing it at quorum
    pub fn approve_ride_tx(&self, tx_id: &str, validator: &str) -> Result<ApprovalOutcome> {
        if !self.validators.is_validator(validator) {
            return Err(ChainError::NotAValidator(validator.to_string()));
        }
        self.quorum
            .approve(&self.pool, &self.committed, &self.validators, tx_id, validator)
    }

    /// Whether the driver has a pending ride that has not been dropped off
    pub fn has_active_ride(&self, driver_id: &str) -> bool {
        self.pool.has_active_ride(driver_id)
    }

    pub fn pending_ride(&self, tx_id: &str) -> Option<RideTransaction> {
        self.pool.get(tx_id)
    }

    pub fn committed_ride(&self, tx_id: &str) -> Option<RideTransaction> {
        self.committed.get(tx_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pool.len()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    /// Committed transaction IDs, oldest first
    pub fn committed_tx_ids(&self) -> Vec<TxId> {
        self.committed.tx_ids()
    }

    /// Validators that approved a pending ride so far
    pub fn approvals_for(&self, tx_id: &str) -> Option<Vec<ParticipantId>> {
        self.pool.approvals(tx_id)
    }

    // Driver verification

    pub fn request_driver_verification(
        &self,
        driver_id: &str,
        requested_by: &str,
    ) -> Result<DriverVerificationRequest> {
        self.verifications.request(driver_id, requested_by)
    }

    /// Approve a driver's pending verification request
    pub fn verify_driver(
        &self,
        driver_id: &str,
        validator: &str,
        results: &str,
    ) -> Result<VerificationAudit> {
        if !self.validators.is_validator(validator) {
            return Err(ChainError::NotAValidator(validator.to_string()));
        }
        self.verifications.approve(driver_id, validator, results)
    }

    pub fn is_driver_verified(&self, driver_id: &str) -> bool {
        self.verifications.is_verified(driver_id)
    }

    pub fn verification_request(&self, driver_id: &str) -> Option<DriverVerificationRequest> {
        self.verifications.request_for(driver_id)
    }

    pub fn verification_audit(&self) -> Vec<VerificationAudit> {
        self.verifications.audit_log()
    }
}
