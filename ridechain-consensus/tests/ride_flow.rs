//! Integration tests for the complete ride ledger

use ridechain_consensus::*;
use ridechain_core::{
    CoreError, LatLng, LedgerState, LedgerStore, RideEvent, RideEventKind, RideTransaction,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const GENESIS: &str = "genesis-123";
const DRIVER: &str = "driver-123";
const RIDER: &str = "rider-abc";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn chain_with_quorum(quorum: usize) -> RideChain {
    let config = ChainConfig {
        approval_quorum: quorum,
        ..ChainConfig::default()
    };
    RideChain::in_memory(config).unwrap()
}

fn nashville_ride(paid: TokenAmount) -> RideTransaction {
    RideTransaction::new(DRIVER, RIDER, paid)
        .with_pickup_location(LatLng::new(36.1627, -86.7816))
        .with_dropoff_location(LatLng::new(36.1745, -86.7679))
        .with_pickup_code("1931")
        .with_event(RideEvent::new(RideEventKind::RideRequested).with_metadata("surge", false))
        .with_event(RideEvent::new(RideEventKind::DriverAccepted).with_metadata("eta_minutes", 4i64))
        .with_event(RideEvent::new(RideEventKind::RiderPaymentReceived).with_metadata("method", "card"))
}

/// Submit a ride and take it through pickup and dropoff
fn finished_ride(chain: &RideChain) -> TxId {
    let tx_id = chain
        .submit_ride_tx(nashville_ride(100))
        .unwrap()
        .tx_id
        .unwrap();
    chain.submit_pickup_proof(&tx_id, "1931").unwrap();
    chain
        .submit_dropoff(&tx_id, LatLng::new(36.1752, -86.7681))
        .unwrap();
    tx_id
}

/// Register `count` validators after the genesis validator, each staking the minimum
fn add_validators(chain: &RideChain, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let id = format!("validator-{}", i);
            chain.mint_tokens(&id, 10).unwrap();
            chain.stake_tokens(&id, 10).unwrap();
            chain.become_validator(&id).unwrap();
            id
        })
        .collect()
}

#[test]
fn test_complete_ride_flow() {
    init_tracing();
    let chain = chain_with_quorum(1);

    chain.become_validator(GENESIS).unwrap();
    assert_eq!(chain.genesis_validator().as_deref(), Some(GENESIS));
    println!("✅ Genesis validator registered");

    let stored = chain.submit_ride_tx(nashville_ride(100)).unwrap();
    let tx_id = stored.tx_id.clone().unwrap();
    assert!(chain.has_active_ride(DRIVER));
    println!("✅ Ride submitted as {}", tx_id);

    let before = chain.pending_ride(&tx_id).unwrap();
    assert!(matches!(
        chain.submit_pickup_proof(&tx_id, "1234"),
        Err(ChainError::InvalidPickupCode(_))
    ));
    assert_eq!(chain.pending_ride(&tx_id).unwrap(), before);

    chain.submit_pickup_proof(&tx_id, "1931").unwrap();
    println!("✅ Pickup verified");

    chain.submit_dropoff(&tx_id, LatLng::new(36.1752, -86.7681)).unwrap();
    assert!(!chain.has_active_ride(DRIVER));
    println!("✅ Dropoff confirmed");

    let outcome = chain.approve_ride_tx(&tx_id, GENESIS).unwrap();
    assert!(outcome.is_committed());

    let committed = chain.committed_ride(&tx_id).unwrap();
    assert_eq!(committed.paid_amount, 100);
    assert!(committed.pickup_confirmed && committed.dropoff_confirmed);
    let kinds: Vec<_> = committed.events.iter().map(|evt| evt.kind).collect();
    assert_eq!(
        &kinds[3..],
        &[
            RideEventKind::PickupVerified,
            RideEventKind::DropoffConfirmed,
            RideEventKind::RideApproved,
        ]
    );
    assert!(chain.pending_ride(&tx_id).is_none());
    println!("✅ Ride committed");
}

#[test]
fn test_quorum_commits_only_when_reached() {
    init_tracing();

    for quorum in 2..=4 {
        let chain = chain_with_quorum(quorum);
        chain.become_validator(GENESIS).unwrap();
        let mut approvers = vec![GENESIS.to_string()];
        approvers.extend(add_validators(&chain, quorum));

        let tx_id = finished_ride(&chain);

        for (i, validator) in approvers.iter().take(quorum).enumerate() {
            let outcome = chain.approve_ride_tx(&tx_id, validator).unwrap();
            let approvals = i + 1;

            if approvals < quorum {
                assert_eq!(outcome, ApprovalOutcome::Pending { approvals, quorum });
                assert!(chain.committed_ride(&tx_id).is_none());
                assert_eq!(chain.approvals_for(&tx_id).unwrap().len(), approvals);
            } else {
                assert!(outcome.is_committed());
                assert!(chain.committed_ride(&tx_id).is_some());
                assert!(chain.pending_ride(&tx_id).is_none());
            }
        }

        // A late approval finds nothing pending
        let late = &approvers[quorum];
        assert!(matches!(
            chain.approve_ride_tx(&tx_id, late),
            Err(ChainError::TransactionNotFound(_))
        ));
        assert_eq!(chain.committed_count(), 1);
    }
}

#[test]
fn test_duplicate_approval_is_rejected() {
    let chain = chain_with_quorum(2);
    chain.become_validator(GENESIS).unwrap();
    let tx_id = finished_ride(&chain);

    chain.approve_ride_tx(&tx_id, GENESIS).unwrap();
    let err = chain.approve_ride_tx(&tx_id, GENESIS).unwrap_err();

    assert!(matches!(err, ChainError::DuplicateApproval { ref validator, .. } if validator == GENESIS));
    assert_eq!(err.category(), ErrorCategory::Ordering);
    assert_eq!(chain.approvals_for(&tx_id).unwrap(), vec![GENESIS.to_string()]);
    assert_eq!(chain.committed_count(), 0);
}

#[test]
fn test_no_approval_before_dropoff() {
    let chain = chain_with_quorum(1);
    chain.become_validator(GENESIS).unwrap();
    let tx_id = chain
        .submit_ride_tx(nashville_ride(100))
        .unwrap()
        .tx_id
        .unwrap();

    let submitted = chain.pending_ride(&tx_id).unwrap();
    let err = chain.approve_ride_tx(&tx_id, GENESIS).unwrap_err();
    assert!(matches!(err, ChainError::DropoffNotConfirmed(_)));
    assert_eq!(err.category(), ErrorCategory::Ordering);
    assert_eq!(chain.pending_ride(&tx_id).unwrap(), submitted);

    chain.submit_pickup_proof(&tx_id, "1931").unwrap();
    let picked_up = chain.pending_ride(&tx_id).unwrap();
    assert!(matches!(
        chain.approve_ride_tx(&tx_id, GENESIS),
        Err(ChainError::DropoffNotConfirmed(_))
    ));
    assert_eq!(chain.pending_ride(&tx_id).unwrap(), picked_up);

    assert_eq!(chain.approvals_for(&tx_id).unwrap(), Vec::<String>::new());
    assert!(chain.committed_ride(&tx_id).is_none());

    chain
        .submit_dropoff(&tx_id, LatLng::new(36.1752, -86.7681))
        .unwrap();
    assert!(chain.approve_ride_tx(&tx_id, GENESIS).unwrap().is_committed());
}

#[test]
fn test_overflowing_mint_is_rejected() {
    let chain = chain_with_quorum(1);
    chain.mint_tokens(DRIVER, u64::MAX).unwrap();
    chain.stake_tokens(DRIVER, u64::MAX).unwrap();
    chain.mint_tokens(DRIVER, u64::MAX).unwrap();
    let before = chain.ledger_snapshot();

    let err = chain.stake_tokens(DRIVER, u64::MAX).unwrap_err();
    assert!(matches!(err, ChainError::BalanceOverflow(_)));
    assert_eq!(err.category(), ErrorCategory::Economic);
    assert!(matches!(
        chain.mint_tokens(DRIVER, 5),
        Err(ChainError::BalanceOverflow(_))
    ));

    let after = chain.ledger_snapshot();
    assert_eq!(after, before);
    assert_eq!(after.total_supply(), 2 * u128::from(u64::MAX));
}

#[test]
fn test_resubmission_gets_new_id() {
    let chain = chain_with_quorum(1);
    chain.become_validator(GENESIS).unwrap();

    let ride = nashville_ride(100);
    let stored = chain.submit_ride_tx(ride.clone()).unwrap();
    let tx_id = stored.tx_id.unwrap();

    // Same content submitted again gets a fresh submission time, hence a new ID
    let second = chain.submit_ride_tx(ride).unwrap();
    assert_ne!(second.tx_id.as_deref(), Some(tx_id.as_str()));
    assert_eq!(chain.pending_count(), 2);

    chain.submit_pickup_proof(&tx_id, "1931").unwrap();
    chain
        .submit_dropoff(&tx_id, LatLng::new(36.1752, -86.7681))
        .unwrap();
    chain.approve_ride_tx(&tx_id, GENESIS).unwrap();
    assert_eq!(chain.pending_count(), 1);
    assert_eq!(chain.committed_tx_ids(), vec![tx_id]);
}

#[test]
fn test_staking_economy() {
    init_tracing();
    let chain = chain_with_quorum(1);

    assert!(matches!(
        chain.stake_tokens(DRIVER, 10),
        Err(ChainError::InsufficientBalance { needed: 10, available: 0 })
    ));
    assert_eq!(chain.ledger_snapshot(), LedgerState::default());

    chain.become_validator(GENESIS).unwrap();
    chain.mint_tokens(DRIVER, 50).unwrap();
    chain.stake_tokens(DRIVER, 30).unwrap();
    assert_eq!(chain.driver_balance(DRIVER) + chain.driver_stake(DRIVER), 50);

    chain.become_validator(DRIVER).unwrap();
    assert!(chain.is_validator(DRIVER));

    chain.reward_validator(DRIVER, 5).unwrap();
    assert_eq!(chain.driver_balance(DRIVER), 25);

    let record = chain.slash_validator(DRIVER, GENESIS, "approved a ghost ride").unwrap();
    assert_eq!(record.slashed_amount, 15);
    assert_eq!(chain.driver_stake(DRIVER), 15);
    assert!(!chain.is_validator(DRIVER));
    assert_eq!(chain.slash_history().len(), 1);

    // A slashed driver can earn the role back with enough stake
    chain.become_validator(DRIVER).unwrap();
    assert_eq!(chain.validators().len(), 2);

    assert!(matches!(
        chain.slash_validator(GENESIS, RIDER, "grudge"),
        Err(ChainError::Unauthorized(_))
    ));
    assert!(matches!(
        chain.slash_validator(RIDER, GENESIS, "not staked"),
        Err(ChainError::NotAValidator(_))
    ));
}

#[test]
fn test_verification_workflow() {
    let chain = chain_with_quorum(1);
    chain.become_validator(GENESIS).unwrap();

    assert!(matches!(
        chain.verify_driver(DRIVER, GENESIS, "ok"),
        Err(ChainError::NoPendingVerification(_))
    ));

    let request = chain.request_driver_verification(DRIVER, RIDER).unwrap();
    assert_eq!(request.status, VerificationStatus::Pending);
    assert!(matches!(
        chain.request_driver_verification(DRIVER, DRIVER),
        Err(ChainError::AlreadyRequested(_))
    ));

    let audit = chain
        .verify_driver(DRIVER, GENESIS, "background check clear, insurance active")
        .unwrap();
    assert_eq!(audit.request_id, request.id);
    assert!(chain.is_driver_verified(DRIVER));
    assert_eq!(
        chain.verification_request(DRIVER).unwrap().status,
        VerificationStatus::Approved
    );
    assert_eq!(chain.verification_audit().len(), 1);
}

struct BrokenDisk;

impl LedgerStore for BrokenDisk {
    fn load(&self) -> ridechain_core::Result<LedgerState> {
        Ok(LedgerState::default())
    }

    fn save(&self, _state: &LedgerState) -> ridechain_core::Result<()> {
        Err(CoreError::Storage("read-only filesystem".to_string()))
    }
}

#[test]
fn test_persistence_failure_is_reported() {
    init_tracing();
    let chain = RideChain::with_store(ChainConfig::default(), Box::new(BrokenDisk)).unwrap();

    let err = chain.mint_tokens(DRIVER, 20).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Persistence);
    assert!(err.is_applied_in_memory());
    assert_eq!(chain.driver_balance(DRIVER), 20);

    assert!(matches!(chain.flush_ledger(), Err(ChainError::Persistence(_))));
}

#[test]
fn test_ledger_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = ChainConfig::with_ledger_path(temp_dir.path().join("data").join("token_ledger.json"));

    {
        let chain = RideChain::new(config.clone()).unwrap();
        chain.mint_tokens(DRIVER, 40).unwrap();
        chain.stake_tokens(DRIVER, 25).unwrap();
    }

    let reopened = RideChain::new(config).unwrap();
    assert_eq!(reopened.driver_balance(DRIVER), 15);
    assert_eq!(reopened.driver_stake(DRIVER), 25);

    // Validator membership is not persisted
    assert!(reopened.validators().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_commit_once() {
    init_tracing();
    let quorum = 3;
    let chain = Arc::new(chain_with_quorum(quorum));
    chain.become_validator(GENESIS).unwrap();
    let mut validators = vec![GENESIS.to_string()];
    validators.extend(add_validators(&chain, 7));

    let tx_id = finished_ride(&chain);

    let handles: Vec<_> = validators
        .iter()
        .cloned()
        .map(|validator| {
            let chain = Arc::clone(&chain);
            let tx_id = tx_id.clone();
            tokio::task::spawn_blocking(move || chain.approve_ride_tx(&tx_id, &validator))
        })
        .collect();

    let mut commits = 0;
    let mut pending = HashSet::new();
    let mut not_found = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ApprovalOutcome::Committed { .. }) => commits += 1,
            Ok(ApprovalOutcome::Pending { approvals, .. }) => {
                assert!(pending.insert(approvals));
            }
            Err(ChainError::TransactionNotFound(_)) => not_found += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(commits, 1);
    assert_eq!(pending.len(), quorum - 1);
    assert_eq!(not_found, validators.len() - quorum);
    assert_eq!(chain.committed_count(), 1);
    assert_eq!(chain.pending_count(), 0);

    let approvals = chain
        .committed_ride(&tx_id)
        .unwrap()
        .events
        .iter()
        .filter(|evt| evt.kind == RideEventKind::RideApproved)
        .count();
    assert_eq!(approvals, quorum);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_staking_conserves_supply() {
    let chain = Arc::new(chain_with_quorum(1));
    let drivers: Vec<String> = (0..16).map(|i| format!("driver-{}", i)).collect();
    for driver in &drivers {
        chain.mint_tokens(driver, 100).unwrap();
    }

    let handles: Vec<_> = drivers
        .iter()
        .cloned()
        .map(|driver| {
            let chain = Arc::clone(&chain);
            tokio::task::spawn_blocking(move || {
                for _ in 0..10 {
                    chain.stake_tokens(&driver, 7).unwrap();
                    chain.unstake_tokens(&driver, 3).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = chain.ledger_snapshot();
    assert_eq!(snapshot.total_supply(), 16 * 100);
    for driver in &drivers {
        assert_eq!(chain.driver_stake(driver), 40);
        assert_eq!(chain.driver_balance(driver), 60);
    }
}
