//! Ride transactions, lifecycle events and content hashing

use crate::{CoreError, ParticipantId, Result, TokenAmount, TxId, ValidationError};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::fmt;

/// Events a ride must carry before it can be submitted
pub const REQUIRED_SUBMISSION_EVENTS: [RideEventKind; 3] = [
    RideEventKind::RideRequested,
    RideEventKind::DriverAccepted,
    RideEventKind::RiderPaymentReceived,
];

/// A geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Create a new point
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether the point lies on the globe
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Kinds of events recorded against a ride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RideEventKind {
    RideRequested,
    DriverAccepted,
    RiderPaymentReceived,
    /// A validator approved the ride
    RideApproved,
    PickupVerified,
    DropoffConfirmed,
    InsuranceVerified,
    DriverValidated,
}

/// Primitive metadata value attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Integer(i64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Flag(value)
    }
}

/// Ordered so that serialization, and therefore hashing, is deterministic
pub type EventMetadata = BTreeMap<String, MetadataValue>;

/// A single lifecycle event of a ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideEvent {
    pub kind: RideEventKind,
    pub timestamp: DateTime<Utc>,
    /// Validator that produced the event, if any
    pub validator: Option<ParticipantId>,
    pub metadata: EventMetadata,
}

impl RideEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: RideEventKind) -> Self {
        Self::at(kind, Utc::now())
    }

    /// Create an event with an explicit timestamp
    pub fn at(kind: RideEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            validator: None,
            metadata: EventMetadata::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl Into<ParticipantId>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Stage of a ride that has not been committed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideStage {
    Submitted,
    PickupConfirmed,
    DropoffConfirmed,
}

impl fmt::Display for RideStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RideStage::Submitted => "submitted",
            RideStage::PickupConfirmed => "pickup confirmed",
            RideStage::DropoffConfirmed => "dropoff confirmed",
        };
        f.write_str(name)
    }
}

/// Core ride transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideTransaction {
    /// Assigned once at submission from the content hash
    pub tx_id: Option<TxId>,

    pub driver_id: ParticipantId,

    pub rider_id: ParticipantId,

    /// When the rider started building the ride request
    pub requested_at: DateTime<Utc>,

    /// When the ledger accepted the ride
    pub submitted_at: Option<DateTime<Utc>>,

    pub pickup_at: Option<DateTime<Utc>>,

    pub dropoff_at: Option<DateTime<Utc>>,

    pub pickup_location: Option<LatLng>,

    /// Requested destination, replaced by the actual dropoff point on arrival
    pub dropoff_location: Option<LatLng>,

    pub paid_amount: TokenAmount,

    /// Code the rider hands the driver at pickup
    pub pickup_code: String,

    pub pickup_confirmed: bool,

    pub dropoff_confirmed: bool,

    /// Lifecycle events in the order they happened
    pub events: Vec<RideEvent>,
}

/// Every field of a ride except its ID, borrowed for hashing
#[derive(Serialize)]
struct HashableRide<'a> {
    driver_id: &'a str,
    rider_id: &'a str,
    requested_at: &'a DateTime<Utc>,
    submitted_at: &'a Option<DateTime<Utc>>,
    pickup_at: &'a Option<DateTime<Utc>>,
    dropoff_at: &'a Option<DateTime<Utc>>,
    pickup_location: &'a Option<LatLng>,
    dropoff_location: &'a Option<LatLng>,
    paid_amount: TokenAmount,
    pickup_code: &'a str,
    pickup_confirmed: bool,
    dropoff_confirmed: bool,
    events: &'a [RideEvent],
    version: &'a str,
}

impl RideTransaction {
    /// Create an unsubmitted ride requested now
    pub fn new(
        driver_id: impl Into<ParticipantId>,
        rider_id: impl Into<ParticipantId>,
        paid_amount: TokenAmount,
    ) -> Self {
        Self {
            tx_id: None,
            driver_id: driver_id.into(),
            rider_id: rider_id.into(),
            requested_at: Utc::now(),
            submitted_at: None,
            pickup_at: None,
            dropoff_at: None,
            pickup_location: None,
            dropoff_location: None,
            paid_amount,
            pickup_code: String::new(),
            pickup_confirmed: false,
            dropoff_confirmed: false,
            events: Vec::new(),
        }
    }

    pub fn with_pickup_location(mut self, location: LatLng) -> Self {
        self.pickup_location = Some(location);
        self
    }

    pub fn with_dropoff_location(mut self, location: LatLng) -> Self {
        self.dropoff_location = Some(location);
        self
    }

    pub fn with_pickup_code(mut self, code: impl Into<String>) -> Self {
        self.pickup_code = code.into();
        self
    }

    pub fn with_requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self
    }

    pub fn with_event(mut self, event: RideEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Append a bare event of the given kind stamped now
    pub fn record(&mut self, kind: RideEventKind) {
        self.events.push(RideEvent::new(kind));
    }

    /// Generate a random four digit pickup code
    pub fn generate_pickup_code() -> String {
        let code: u16 = rand::thread_rng().gen_range(0..10_000);
        format!("{:04}", code)
    }

    /// Whether an event of this kind has been recorded
    pub fn has_event(&self, kind: RideEventKind) -> bool {
        self.events.iter().any(|evt| evt.kind == kind)
    }

    /// Current stage in the pending lifecycle
    pub fn stage(&self) -> RideStage {
        if self.dropoff_confirmed {
            RideStage::DropoffConfirmed
        } else if self.pickup_confirmed {
            RideStage::PickupConfirmed
        } else {
            RideStage::Submitted
        }
    }

    /// Check the structure of a ride before it is accepted by the ledger.
    ///
    /// `max_skew` bounds how far `requested_at` may lie ahead of `now`.
    pub fn validate(&self, now: DateTime<Utc>, max_skew: Duration) -> std::result::Result<(), ValidationError> {
        if self.tx_id.is_some() {
            return Err(ValidationError::PreassignedId);
        }

        if self.driver_id.is_empty() || self.rider_id.is_empty() {
            return Err(ValidationError::MissingIdentity);
        }

        if self.paid_amount == 0 {
            return Err(ValidationError::InvalidPaidAmount);
        }

        if !self.pickup_location.map_or(false, |loc| loc.is_valid()) {
            return Err(ValidationError::MissingPickupLocation);
        }

        if !self.dropoff_location.map_or(false, |loc| loc.is_valid()) {
            return Err(ValidationError::MissingDropoffLocation);
        }

        if self.events.is_empty() {
            return Err(ValidationError::NoEvents);
        }

        if let Some(missing) = REQUIRED_SUBMISSION_EVENTS
            .iter()
            .find(|kind| !self.has_event(**kind))
        {
            return Err(ValidationError::IncompleteEventFlow { missing: *missing });
        }

        let ahead = self.requested_at - now;
        if ahead > max_skew {
            return Err(ValidationError::FutureTimestamp {
                ahead_secs: ahead.num_seconds(),
                tolerance_secs: max_skew.num_seconds(),
            });
        }

        Ok(())
    }

    /// Hex-encoded SHA3-256 of the canonical serialization, excluding `tx_id`
    pub fn content_hash(&self) -> Result<TxId> {
        let hashable = HashableRide {
            driver_id: &self.driver_id,
            rider_id: &self.rider_id,
            requested_at: &self.requested_at,
            submitted_at: &self.submitted_at,
            pickup_at: &self.pickup_at,
            dropoff_at: &self.dropoff_at,
            pickup_location: &self.pickup_location,
            dropoff_location: &self.dropoff_location,
            paid_amount: self.paid_amount,
            pickup_code: &self.pickup_code,
            pickup_confirmed: self.pickup_confirmed,
            dropoff_confirmed: self.dropoff_confirmed,
            events: &self.events,
            version: crate::RIDECHAIN_VERSION,
        };

        let bytes = serde_json::to_vec(&hashable)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        let mut hasher = Sha3_256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
