//! Off-chain driver verification requests
//!
//! A driver (or someone on their behalf) asks for verification; a validator
//! reviews the background check and insurance results gathered off-chain and
//! approves the request. Each approval leaves an audit entry.

use crate::{ChainError, ParticipantId, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Verification request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Pending,
    Approved,
}

/// A request to verify a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverVerificationRequest {
    pub id: Uuid,
    pub driver_id: ParticipantId,
    pub requested_by: ParticipantId,
    pub requested_at: DateTime<Utc>,
    pub status: VerificationStatus,
}

/// Audit entry written when a validator verifies a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationAudit {
    pub request_id: Uuid,
    pub driver_id: ParticipantId,
    pub validator: ParticipantId,
    /// Summary of the background check / insurance lookup
    pub results: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Desk {
    requests: HashMap<ParticipantId, DriverVerificationRequest>,
    audit: Vec<VerificationAudit>,
}

/// Latest verification request per driver plus the audit trail
#[derive(Debug, Default)]
pub struct VerificationDesk {
    desk: RwLock<Desk>,
}

impl VerificationDesk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a verification request for a driver.
    ///
    /// Fails while a pending request for the same driver exists; an approved
    /// request is superseded.
    pub fn request(&self, driver_id: &str, requested_by: &str) -> Result<DriverVerificationRequest> {
        let mut desk = self.desk.write();

        if let Some(existing) = desk.requests.get(driver_id) {
            if existing.status == VerificationStatus::Pending {
                return Err(ChainError::AlreadyRequested(driver_id.to_string()));
            }
        }

        let request = DriverVerificationRequest {
            id: Uuid::new_v4(),
            driver_id: driver_id.to_string(),
            requested_by: requested_by.to_string(),
            requested_at: Utc::now(),
            status: VerificationStatus::Pending,
        };
        desk.requests.insert(driver_id.to_string(), request.clone());

        tracing::info!(driver = driver_id, requested_by, request_id = %request.id, "driver verification requested");
        Ok(request)
    }

    /// Approve the pending request of a driver. The caller has already
    /// checked that `validator` holds the validator role.
    pub fn approve(&self, driver_id: &str, validator: &str, results: &str) -> Result<VerificationAudit> {
        let mut desk = self.desk.write();

        let request = desk
            .requests
            .get_mut(driver_id)
            .filter(|request| request.status == VerificationStatus::Pending)
            .ok_or_else(|| ChainError::NoPendingVerification(driver_id.to_string()))?;
        request.status = VerificationStatus::Approved;

        let entry = VerificationAudit {
            request_id: request.id,
            driver_id: driver_id.to_string(),
            validator: validator.to_string(),
            results: results.to_string(),
            verified_at: Utc::now(),
        };
        desk.audit.push(entry.clone());

        tracing::info!(driver = driver_id, validator, results, "driver verified");
        Ok(entry)
    }

    /// Latest request for a driver
    pub fn request_for(&self, driver_id: &str) -> Option<DriverVerificationRequest> {
        self.desk.read().requests.get(driver_id).cloned()
    }

    pub fn is_verified(&self, driver_id: &str) -> bool {
        self.desk
            .read()
            .requests
            .get(driver_id)
            .map_or(false, |request| request.status == VerificationStatus::Approved)
    }

    pub fn audit_log(&self) -> Vec<VerificationAudit> {
        self.desk.read().audit.clone()
    }
}
