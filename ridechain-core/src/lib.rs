//! RideChain Core - ride transaction model and ledger storage
//!
//! This crate provides the value types shared by the RideChain ledger: ride
//! transactions and their lifecycle events, structural validation, content
//! hashing used to derive transaction IDs, and the durable store that holds
//! token balances and stakes.

pub mod error;
pub mod ride;
pub mod storage;

pub use error::{CoreError, ValidationError};
pub use ride::{
    EventMetadata, LatLng, MetadataValue, RideEvent, RideEventKind, RideStage, RideTransaction,
    REQUIRED_SUBMISSION_EVENTS,
};
pub use storage::{FileLedgerStore, LedgerState, LedgerStore, MemoryLedgerStore};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Identity of a rider, driver or validator
pub type ParticipantId = String;

/// Transaction ID (hex-encoded content hash)
pub type TxId = String;

/// Token amount (balances, stakes, fares)
pub type TokenAmount = u64;

/// RideChain protocol version
pub const RIDECHAIN_VERSION: &str = "0.1.0";
