//! Error types for RideChain core operations

use crate::ride::RideEventKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid ride transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural problems found in a submitted ride transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing core identifiers (driver and rider are required)")]
    MissingIdentity,

    #[error("invalid or missing paid amount")]
    InvalidPaidAmount,

    #[error("invalid pickup location")]
    MissingPickupLocation,

    #[error("invalid drop off location")]
    MissingDropoffLocation,

    #[error("no ride events recorded")]
    NoEvents,

    #[error("ride event flow incomplete: missing {missing:?}")]
    IncompleteEventFlow { missing: RideEventKind },

    #[error("requested timestamp is {ahead_secs}s in the future (tolerance {tolerance_secs}s)")]
    FutureTimestamp { ahead_secs: i64, tolerance_secs: i64 },

    #[error("transaction ID is assigned at submission and must not be preset")]
    PreassignedId,
}
