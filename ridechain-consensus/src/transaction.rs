//! Pending ride pool and the committed ride ledger
//!
//! Pending rides are keyed by transaction ID. Each ride sits in its own
//! mutex so work on different rides never contends; the map lock is held
//! only long enough to look up, insert or remove a slot and is never held
//! while waiting on a slot.

use crate::{ChainError, ParticipantId, Result, TxId};
use parking_lot::{Mutex, RwLock};
use ridechain_core::RideTransaction;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A submitted ride and the validators that approved it so far
#[derive(Debug, Clone)]
pub struct PendingRide {
    ride: RideTransaction,
    approvals: BTreeSet<ParticipantId>,
    /// Set once the ride left the pool; holders of a stale slot see NotFound
    retired: bool,
}

impl PendingRide {
    fn new(ride: RideTransaction) -> Self {
        Self {
            ride,
            approvals: BTreeSet::new(),
            retired: false,
        }
    }

    pub fn ride(&self) -> &RideTransaction {
        &self.ride
    }

    pub fn approvals(&self) -> &BTreeSet<ParticipantId> {
        &self.approvals
    }

    /// Record an approval, returning false if the validator already approved
    pub(crate) fn add_approval(&mut self, validator: &str) -> bool {
        self.approvals.insert(validator.to_string())
    }

    /// Swap in an updated copy of the ride after checking it is the same ride
    pub(crate) fn replace(&mut self, updated: RideTransaction) -> Result<()> {
        if updated.tx_id != self.ride.tx_id {
            return Err(ChainError::TransactionNotFound(
                updated.tx_id.unwrap_or_default(),
            ));
        }
        self.ride = updated;
        Ok(())
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }
}

type RideSlot = Arc<Mutex<PendingRide>>;

/// Rides submitted but not yet committed
#[derive(Debug, Default)]
pub struct RidePool {
    rides: RwLock<HashMap<TxId, RideSlot>>,
}

impl RidePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a submitted ride with an empty approval set
    pub fn insert(&self, ride: RideTransaction) -> Result<()> {
        let tx_id = ride
            .tx_id
            .clone()
            .ok_or_else(|| ChainError::TransactionNotFound(String::new()))?;

        let mut rides = self.rides.write();
        if rides.contains_key(&tx_id) {
            return Err(ChainError::DuplicateTransaction(tx_id));
        }
        rides.insert(tx_id, Arc::new(Mutex::new(PendingRide::new(ride))));
        Ok(())
    }

    /// Copy of a pending ride
    pub fn get(&self, tx_id: &str) -> Option<RideTransaction> {
        let slot = self.slot(tx_id)?;
        let entry = slot.lock();
        (!entry.retired).then(|| entry.ride.clone())
    }

    /// Validators that approved a pending ride
    pub fn approvals(&self, tx_id: &str) -> Option<Vec<ParticipantId>> {
        let slot = self.slot(tx_id)?;
        let entry = slot.lock();
        (!entry.retired).then(|| entry.approvals.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.rides.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.read().is_empty()
    }

    /// Whether the driver has a pending ride that has not reached dropoff
    pub fn has_active_ride(&self, driver_id: &str) -> bool {
        let slots: Vec<RideSlot> = self.rides.read().values().cloned().collect();
        slots.iter().any(|slot| {
            let entry = slot.lock();
            !entry.retired && entry.ride.driver_id == driver_id && !entry.ride.dropoff_confirmed
        })
    }

    /// Run `f` on a locked pending ride
    pub(crate) fn with_ride<R>(
        &self,
        tx_id: &str,
        f: impl FnOnce(&mut PendingRide) -> Result<R>,
    ) -> Result<R> {
        let slot = self
            .slot(tx_id)
            .ok_or_else(|| ChainError::TransactionNotFound(tx_id.to_string()))?;

        let mut entry = slot.lock();
        if entry.retired {
            return Err(ChainError::TransactionNotFound(tx_id.to_string()));
        }
        f(&mut *entry)
    }

    /// Drop a ride from the pool. Callers hold the ride's slot lock.
    pub(crate) fn remove(&self, tx_id: &str) {
        self.rides.write().remove(tx_id);
    }

    fn slot(&self, tx_id: &str) -> Option<RideSlot> {
        self.rides.read().get(tx_id).cloned()
    }
}

#[derive(Debug, Default)]
struct CommittedRides {
    by_id: HashMap<TxId, RideTransaction>,
    order: Vec<TxId>,
}

/// Append-only store of approved rides
#[derive(Debug, Default)]
pub struct CommittedLedger {
    rides: RwLock<CommittedRides>,
}

impl CommittedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a ride; an ID can only ever be committed once
    pub fn append(&self, ride: RideTransaction) -> Result<()> {
        let tx_id = ride
            .tx_id
            .clone()
            .ok_or_else(|| ChainError::TransactionNotFound(String::new()))?;

        let mut rides = self.rides.write();
        if rides.by_id.contains_key(&tx_id) {
            return Err(ChainError::DuplicateTransaction(tx_id));
        }
        rides.order.push(tx_id.clone());
        rides.by_id.insert(tx_id, ride);
        Ok(())
    }

    pub fn get(&self, tx_id: &str) -> Option<RideTransaction> {
        self.rides.read().by_id.get(tx_id).cloned()
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.rides.read().by_id.contains_key(tx_id)
    }

    pub fn len(&self) -> usize {
        self.rides.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.read().order.is_empty()
    }

    /// Transaction IDs in commit order
    pub fn tx_ids(&self) -> Vec<TxId> {
        self.rides.read().order.clone()
    }
}
