//! Quorum approval of pending rides
//!
//! A ride commits once the number of distinct validators that approved it
//! reaches the configured quorum. Only rides whose dropoff has been confirmed
//! can be approved. Recording the approval, checking the threshold and moving
//! the ride to the committed ledger all happen while the ride's slot is
//! locked, so concurrent approvals of one ride can neither lose an approval
//! nor commit twice.

use crate::transaction::{CommittedLedger, RidePool};
use crate::validator::ValidatorRegistry;
use crate::{ChainError, Result, TxId};
use ridechain_core::{RideEvent, RideEventKind, RideStage};
use serde::{Deserialize, Serialize};

/// Result of recording one approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalOutcome {
    /// Still waiting for more validators
    Pending { approvals: usize, quorum: usize },

    /// Quorum reached; the ride is now in the committed ledger
    Committed { tx_id: TxId },
}

impl ApprovalOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ApprovalOutcome::Committed { .. })
    }
}

/// Approval-count threshold for committing rides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    quorum: usize,
}

impl QuorumPolicy {
    /// Create a policy; a quorum of zero is treated as one
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum: quorum.max(1),
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn is_met(&self, approvals: usize) -> bool {
        approvals >= self.quorum
    }

    /// Record `validator`'s approval of a dropped-off ride and commit it if
    /// the quorum is reached.
    ///
    /// Validator membership is checked again under the ride's lock, so an
    /// approval racing a slash of the same validator is either counted before
    /// the slash or rejected.
    pub fn approve(
        &self,
        pool: &RidePool,
        committed: &CommittedLedger,
        validators: &ValidatorRegistry,
        tx_id: &str,
        validator: &str,
    ) -> Result<ApprovalOutcome> {
        pool.with_ride(tx_id, |entry| {
            if !validators.is_validator(validator) {
                return Err(ChainError::NotAValidator(validator.to_string()));
            }

            if entry.ride().stage() != RideStage::DropoffConfirmed {
                return Err(ChainError::DropoffNotConfirmed(tx_id.to_string()));
            }

            if entry.approvals().contains(validator) {
                return Err(ChainError::DuplicateApproval {
                    tx_id: tx_id.to_string(),
                    validator: validator.to_string(),
                });
            }

            let mut updated = entry.ride().clone();
            updated.events.push(
                RideEvent::new(RideEventKind::RideApproved).with_validator(validator),
            );
            let approvals = entry.approvals().len() + 1;

            if !self.is_met(approvals) {
                entry.replace(updated)?;
                entry.add_approval(validator);
                tracing::info!(tx_id, validator, approvals, quorum = self.quorum, "ride approval recorded");
                return Ok(ApprovalOutcome::Pending {
                    approvals,
                    quorum: self.quorum,
                });
            }

            // Nothing in the pool changes unless the commit went through
            committed.append(updated.clone())?;
            entry.replace(updated)?;
            entry.add_approval(validator);
            pool.remove(tx_id);
            entry.retire();

            tracing::info!(tx_id, validator, approvals, "ride approved and committed");
            Ok(ApprovalOutcome::Committed {
                tx_id: tx_id.to_string(),
            })
        })
    }
}
