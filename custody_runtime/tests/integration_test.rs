//! Integration tests for custody_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs;

use custody_ledger::events::CallEnvelope;
use custody_ledger::hashing::canonical_hash;
use custody_ledger::{
    Address, CustodyLedger, DeviceId, Felt, LedgerConfig, LedgerError, Selector, TokenId,
};

use custody_runtime::drift;
use custody_runtime::event_store::EventStore;
use custody_runtime::proto_bridge::{kernel_to_proto, proto_to_kernel};
use custody_runtime::replay;
use custody_runtime::session::Session;
use custody_runtime::snapshot;
use custody_runtime::snapshot_codec;
use custody_runtime::RuntimeError;

fn admin() -> Address {
    Address::from_u64(0xa0)
}

/// A fixed workload: four owners each register a device and start a
/// couple of cycles. Returns the accepted envelopes in order.
fn workload() -> Vec<CallEnvelope> {
    let mut ledger = CustodyLedger::deploy(admin(), LedgerConfig::default());
    let mut envelopes = Vec::new();
    let mut push = |ledger: &mut CustodyLedger, caller: Address, selector: Selector, calldata: Vec<Felt>| {
        let env = ledger.envelope(caller, selector, calldata).expect("sequence available");
        ledger.invoke(&env).expect("workload call accepted");
        envelopes.push(env);
    };

    for owner in 1..=4u64 {
        let caller = Address::from_u64(owner);
        push(
            &mut ledger,
            caller,
            Selector::InitDevice,
            vec![Felt::from(12340 + owner), Felt::from(owner), Felt::from(0x90 + owner)],
        );
    }
    for round in 0..3u64 {
        for owner in 1..=4u64 {
            let token = TokenId::from_u64(round * 10 + owner);
            let [low, high] = custody_ledger::felt::split_words(token.0);
            push(
                &mut ledger,
                Address::from_u64(owner),
                Selector::InitCycle,
                vec![low, high],
            );
        }
    }
    envelopes
}

fn open_session(dir: &std::path::Path, id: &str, interval: u64) -> Session {
    Session::new(dir, id, admin(), LedgerConfig::default(), interval).expect("open session")
}

fn apply_all(session: &mut Session, envelopes: &[CallEnvelope]) {
    for env in envelopes {
        session.apply(env).expect("apply");
    }
}

// ─────────────────────────────────────────────────────────────
// Test 1: append_and_replay_is_deterministic
// ─────────────────────────────────────────────────────────────

#[test]
fn append_and_replay_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let log_path = dir.path().join("events.log");

    {
        let mut store = EventStore::open(&log_path).expect("open store");
        for env in &envelopes {
            store.append_event(&kernel_to_proto(env)).expect("append");
        }
        assert_eq!(store.last_sequence(), envelopes.len() as u64);
    }

    let store = EventStore::open(&log_path).expect("reopen store");
    let loaded: Vec<CallEnvelope> = store
        .load_all_events()
        .expect("load")
        .iter()
        .map(|p| proto_to_kernel(p).expect("bridge"))
        .collect();
    assert_eq!(loaded, envelopes);

    let (_, hash_direct) = replay::rebuild_state(admin(), LedgerConfig::default(), &envelopes)
        .expect("replay direct");
    let (state, hash_loaded) = replay::rebuild_state(admin(), LedgerConfig::default(), &loaded)
        .expect("replay loaded");
    assert_eq!(hash_direct, hash_loaded);
    assert_eq!(state.device_count, 4);
    assert_eq!(state.cycle_count, 12);

    drift::verify_determinism(admin(), LedgerConfig::default(), &loaded).expect("deterministic");
}

// ─────────────────────────────────────────────────────────────
// Test 2: concurrent_sessions_isolated
// ─────────────────────────────────────────────────────────────

#[test]
fn concurrent_sessions_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();

    let mut full = open_session(dir.path(), "full", 0);
    let mut partial = open_session(dir.path(), "partial", 0);
    apply_all(&mut full, &envelopes);
    apply_all(&mut partial, &envelopes[..4]);

    assert_eq!(full.current_sequence(), 16);
    assert_eq!(partial.current_sequence(), 4);
    assert_ne!(full.current_hash(), partial.current_hash());
    assert_eq!(
        partial.query(Selector::CycleCount, &[]).unwrap(),
        vec![Felt::zero()]
    );
    assert!(dir.path().join("full").join("events.log").exists());
    assert!(dir.path().join("partial").join("events.log").exists());
}

// ─────────────────────────────────────────────────────────────
// Test 3: schema_version_rejection
// ─────────────────────────────────────────────────────────────

#[test]
fn schema_version_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let mut session = open_session(dir.path(), "schema", 0);
    session.apply(&envelopes[0]).unwrap();

    let mut bad = envelopes[1].clone();
    bad.schema_version = 99;
    let err = session.apply(&bad).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Ledger(LedgerError::SchemaVersion { expected: 1, actual: 99 })
    ));
    assert_eq!(session.current_sequence(), 1);
}

// ─────────────────────────────────────────────────────────────
// Test 4: corrupted_log_detection
// ─────────────────────────────────────────────────────────────

#[test]
fn corrupted_log_detection() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let log_path = dir.path().join("events.log");
    {
        let mut store = EventStore::open(&log_path).expect("open store");
        for env in &envelopes[..5] {
            store.append_event(&kernel_to_proto(env)).expect("append");
        }
    }

    // Truncate 10 bytes from the end
    let data = fs::read(&log_path).expect("read log");
    fs::write(&log_path, &data[..data.len() - 10]).expect("truncate");

    // Either open fails, or load_all_events fails
    match EventStore::open(&log_path) {
        Ok(store) => assert!(store.load_all_events().is_err()),
        Err(err) => assert_eq!(err.kind(), std::io::ErrorKind::InvalidData),
    }
}

#[test]
fn torn_length_prefix_blocks_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    {
        let mut session = open_session(dir.path(), "torn", 0);
        session.apply(&envelopes[0]).unwrap();
    }

    // A crash mid-append left two bytes of the next length prefix
    let log_path = dir.path().join("torn").join("events.log");
    let mut data = fs::read(&log_path).unwrap();
    data.extend_from_slice(&[0x50, 0x00]);
    fs::write(&log_path, &data).unwrap();

    let reopened = Session::new(dir.path(), "torn", admin(), LedgerConfig::default(), 0);
    match reopened {
        Err(RuntimeError::Io(err)) => {
            assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
            assert!(err.to_string().contains("torn length prefix"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("session reopened over a torn log"),
    }

    // Nothing was appended behind the torn bytes
    assert_eq!(fs::read(&log_path).unwrap(), data);
}

#[test]
fn out_of_order_append_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let mut store = EventStore::open(&dir.path().join("events.log")).unwrap();
    store.append_event(&kernel_to_proto(&envelopes[0])).unwrap();
    let err = store
        .append_event(&kernel_to_proto(&envelopes[2]))
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    assert_eq!(store.last_sequence(), 1);
}

// ─────────────────────────────────────────────────────────────
// Test 5: snapshot_replay_parity
// ─────────────────────────────────────────────────────────────

#[test]
fn snapshot_replay_parity() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let (state, hash) =
        replay::rebuild_state(admin(), LedgerConfig::default(), &envelopes).unwrap();

    let snap_dir = dir.path().join("snapshots");
    let seq = envelopes.len() as u64;
    snapshot::save_snapshot(&snap_dir, seq, &state).expect("save snapshot");

    let loaded = snapshot::load_snapshot(&snap_dir, seq)
        .expect("load snapshot")
        .expect("snapshot should exist");
    assert_eq!(loaded.hash, hash);
    assert_eq!(loaded.kernel_version, custody_ledger::KERNEL_VERSION);
    loaded.verify().expect("snapshot checks");
    assert_eq!(loaded.state, state);

    snapshot::save_snapshot(&snap_dir, 3, &state).unwrap();
    let latest = snapshot::load_latest_snapshot(&snap_dir)
        .expect("load latest")
        .expect("should find latest");
    assert_eq!(latest.sequence, seq);
    assert!(snapshot::load_snapshot(&snap_dir, 99).unwrap().is_none());
}

#[test]
fn session_snapshots_match_replay() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let mut session = open_session(dir.path(), "snap", 5);
    assert_eq!(session.check_snapshot().unwrap(), None);

    apply_all(&mut session, &envelopes);
    let snap_dir = dir.path().join("snap").join("snapshots");
    assert!(snap_dir.join("snapshot_000005.json").exists());
    assert!(snap_dir.join("snapshot_000015.json").exists());
    assert_eq!(session.check_snapshot().unwrap(), Some(true));

    let latest = snapshot::load_latest_snapshot(&snap_dir).unwrap().unwrap();
    let (_, prefix_hash) =
        replay::rebuild_state(admin(), LedgerConfig::default(), &envelopes[..15]).unwrap();
    assert_eq!(latest.hash, prefix_hash);
}

// ─────────────────────────────────────────────────────────────
// Test 6: session reopen and genesis
// ─────────────────────────────────────────────────────────────

#[test]
fn session_reopen_replays_log() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let hash = {
        let mut session = open_session(dir.path(), "reopen", 0);
        apply_all(&mut session, &envelopes);
        session.current_hash()
    };

    let mut session = open_session(dir.path(), "reopen", 0);
    assert_eq!(session.current_sequence(), envelopes.len() as u64);
    assert_eq!(session.current_hash(), hash);
    assert_eq!(session.ledger().user_cycle_count(&Address::from_u64(2)), 3);

    let (_, replayed) = session.replay_full().unwrap();
    assert_eq!(replayed, hash);

    // Sequencing continues where the log left off
    let receipt = session
        .submit(
            Address::from_u64(9),
            Selector::InitDevice,
            vec![Felt::from(1u64), Felt::from(9u64), Felt::from(10u64)],
        )
        .unwrap();
    assert_eq!(receipt.sequence, envelopes.len() as u64 + 1);
}

#[test]
fn genesis_mismatch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    drop(open_session(dir.path(), "g", 0));

    let other_admin = Session::new(dir.path(), "g", Address::from_u64(0xb0), LedgerConfig::default(), 0);
    assert!(matches!(other_admin, Err(RuntimeError::GenesisMismatch { .. })));

    let relaxed = LedgerConfig {
        require_device_owner: false,
        ..LedgerConfig::default()
    };
    let other_config = Session::new(dir.path(), "g", admin(), relaxed, 0);
    assert!(matches!(other_config, Err(RuntimeError::GenesisMismatch { .. })));
}

#[test]
fn rejected_call_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path(), "rejected", 0);
    let u1 = Address::from_u64(1);
    let u3 = Address::from_u64(3);

    session
        .submit(
            u1,
            Selector::InitDevice,
            vec![Felt::from(12342u64), Felt::from(1u64), Felt::from(2u64)],
        )
        .unwrap();
    let err = session
        .submit(u3, Selector::InitCycle, vec![Felt::one(), Felt::zero()])
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Ledger(LedgerError::UnauthorizedInitiator { .. })
    ));

    let log = EventStore::open(&dir.path().join("rejected").join("events.log")).unwrap();
    assert_eq!(log.load_all_events().unwrap().len(), 1);
    assert_eq!(session.ledger().cycle_count(), 0);
}

// ─────────────────────────────────────────────────────────────
// Test 7: codec restore and drift
// ─────────────────────────────────────────────────────────────

#[test]
fn codec_restore_and_drift() {
    let dir = tempfile::tempdir().unwrap();
    let envelopes = workload();
    let (early, _) =
        replay::rebuild_state(admin(), LedgerConfig::default(), &envelopes[..8]).unwrap();
    let (late, late_hash) =
        replay::rebuild_state(admin(), LedgerConfig::default(), &envelopes).unwrap();

    let path = dir.path().join("export").join("late.json");
    snapshot_codec::export_snapshot_to_file(&late, &path).unwrap();
    let restored = snapshot_codec::import_snapshot_from_file(&path).unwrap();
    assert_eq!(canonical_hash(&restored), late_hash);

    let resumed = CustodyLedger::from_state(restored, envelopes.len() as u64).unwrap();
    assert_eq!(resumed.device(&DeviceId::from_u64(12341)).unwrap().owner, Address::from_u64(1));

    let report = drift::compare_states(&early, &late);
    assert_eq!(report.device_count_delta, 0);
    assert_eq!(report.cycle_count_delta, 8);
    assert!(report.added_devices.is_empty());
    assert!(report.new_initiators.is_empty());
    assert_eq!(report.user_cycle_deltas.len(), 4);
    assert!(report.user_cycle_deltas.iter().all(|(_, d)| *d == 2));
}
