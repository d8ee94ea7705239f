// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-crate integration tests exercising the concrete multi-participant
//! scenarios from the distributed operation ledger's design notes (the
//! `core` + `storage` + `ledger` + `server` crates wired together the way a
//! real caller would use them, rather than any single crate in isolation).

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;

use oplg_core::FakeClock;
use oplg_ledger::{LedgerConfig, LedgerRegistry, TickOutcome};
use oplg_server::{router, AppState, RemoteClient};

fn config_with(heartbeat_interval: Duration, staleness_threshold_ms: u64) -> LedgerConfig {
    LedgerConfig {
        heartbeat_interval,
        heartbeat_jitter: Duration::from_millis(0),
        staleness_threshold_ms,
        ..LedgerConfig::default()
    }
}

/// Scenario A (happy path): an initiator creates, a second participant
/// joins, both run a call to completion, and the initiator completes the
/// operation. Verifies the on-disk trail left behind rather than just the
/// in-memory return values.
#[tokio::test]
async fn scenario_a_happy_path_leaves_a_clean_archive() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let registry = LedgerRegistry::new(dir.path(), LedgerConfig::default(), clock.clone()).unwrap();

    let (initiator, _initiator_session) = registry.create_operation("cli".into(), 100).await.unwrap();
    let op_id = initiator.core.op_id().clone();
    let (joiner, _joiner_session) =
        registry.join_operation(op_id.clone(), "bridge".into(), 200).await.unwrap();

    let a = initiator.core.start_call(Some("render".into()), true).await.unwrap();
    let b = joiner.core.start_call(Some("upload".into()), true).await.unwrap();
    clock.advance(Duration::from_millis(50));
    initiator.core.end_call(&a).await.unwrap();
    joiner.core.end_call(&b).await.unwrap();

    registry.complete(&op_id, &"cli".into()).await.unwrap();

    assert!(registry.operation(&op_id, &"cli".into()).is_none());
    let backup_state = oplg_storage::paths::backup_state_path(dir.path(), &op_id);
    let archived: oplg_core::Operation =
        serde_json::from_str(&std::fs::read_to_string(backup_state).unwrap()).unwrap();
    assert_eq!(archived.operation_state, oplg_core::OperationState::Completed);
    assert!(archived.call_frames.is_empty());
    assert!(!oplg_storage::paths::state_path(dir.path(), &op_id).exists());
}

/// Scenario B (crash detection): a participant's call frame goes stale
/// (its heartbeat falls behind `stalenessThresholdMs`) while a second
/// participant is still live. The live participant's own tick observes the
/// other side as stale rather than declaring itself crashed.
#[tokio::test]
async fn scenario_b_crash_detection_flags_the_other_participant_stale() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let config = config_with(Duration::from_secs(5), 10_000);
    let registry = LedgerRegistry::new(dir.path(), config, clock.clone()).unwrap();

    let (initiator, _session) = registry.create_operation("cli".into(), 1).await.unwrap();
    let op_id = initiator.core.op_id().clone();
    let (joiner, _session) = registry.join_operation(op_id, "bridge".into(), 2).await.unwrap();

    let _crashed_call = initiator.core.start_call(Some("doomed".into()), true).await.unwrap();

    // The initiator never ticks again; its last heartbeat sits at t=0.
    // `joiner` advances past the staleness threshold and ticks, which
    // should see the initiator's frame as stale.
    clock.advance(Duration::from_millis(10_500));
    let outcome = joiner.heartbeat.tick().await.unwrap();
    match outcome {
        TickOutcome::StaleOther { stale_participants } => {
            assert!(stale_participants.iter().any(|p| p == "cli"));
        }
        other => panic!("expected StaleOther, got {other:?}"),
    }
}

/// Scenario C (abort propagation), exercised here over the HTTP gateway
/// rather than in-process: one caller sets the abort flag, and a second
/// caller's heartbeat observes it.
#[tokio::test]
async fn scenario_c_abort_propagates_through_the_remote_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let registry = LedgerRegistry::new(dir.path(), LedgerConfig::default(), clock.clone()).unwrap();
    let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let addr: SocketAddr = std_listener.local_addr().unwrap();
    let state = AppState::new(registry, clock, addr);
    let app = router(state);
    let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let client = RemoteClient::new(format!("http://{addr}"));
    let created = client.create_operation("cli", Some("abort me"), None).await.unwrap();

    let set = client.set_abort_flag(&created.operation_id, true).await.unwrap();
    assert!(set.success);

    let hb = client.heartbeat(&created.operation_id).await.unwrap();
    assert!(hb.success);
    assert_eq!(hb.abort_flag, Some(true));
}

/// Scenario D (spawn/sync, all succeed): three spawned calls racing
/// concurrently, none of them failing, `sync` reporting all three
/// successful.
#[tokio::test]
async fn scenario_d_spawned_calls_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let registry = LedgerRegistry::new(dir.path(), LedgerConfig::default(), clock).unwrap();
    let (managed, _session) = registry.create_operation("cli".into(), 1).await.unwrap();

    let mut calls = Vec::new();
    for n in 0..3 {
        let call = managed
            .core
            .spawn_call(None, true, move |_cancel| async move { Ok::<_, String>(n) })
            .await
            .unwrap();
        calls.push(call);
    }

    let result = managed.core.sync(&calls).await;
    assert!(result.all_succeeded());
    assert_eq!(result.successful.len(), 3);
    assert!(result.failed.is_empty());
    assert!(!result.operation_failed);
}

/// Scenario E (contained failure): one spawned call fails with
/// `failOnCrash=false`, so it does not poison the operation, while a
/// sibling call started with `failOnCrash=true` still succeeds
/// independently and the overall sync reports exactly one failure.
#[tokio::test]
async fn scenario_e_contained_failure_does_not_poison_the_operation() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let registry = LedgerRegistry::new(dir.path(), LedgerConfig::default(), clock).unwrap();
    let (managed, _session) = registry.create_operation("cli".into(), 1).await.unwrap();

    let contained_failure = managed
        .core
        .spawn_call(None, false, |_cancel| async { Err::<(), _>("best-effort step failed".to_string()) })
        .await
        .unwrap();
    let healthy = managed
        .core
        .spawn_call(None, true, |_cancel| async { Ok::<_, String>(()) })
        .await
        .unwrap();
    let failure_id = contained_failure.call_id().clone();
    let healthy_id = healthy.call_id().clone();

    let calls = vec![contained_failure, healthy];
    let result = managed.core.sync(&calls).await;
    assert_eq!(result.failed, vec![failure_id]);
    assert_eq!(result.successful, vec![healthy_id]);
    assert!(!result.all_succeeded());
    // `failOnCrash=false` on the failed call means the operation itself was
    // never signaled as failed.
    assert!(!result.operation_failed);
    assert!(managed.core.failure().is_none());
}

/// Scenario F (stale-lock takeover), exercised through two independent
/// registries sharing one base directory to simulate two OS processes: a
/// lock file left behind by a vanished owner with no frames in the state
/// file is an orphan, and a second registry's join does not hang waiting
/// out the full lock timeout.
#[tokio::test]
async fn scenario_f_orphaned_lock_does_not_block_a_fresh_join() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let config = config_with(Duration::from_secs(5), 10_000);

    let registry_a = LedgerRegistry::new(dir.path(), config.clone(), clock.clone()).unwrap();
    let (initiator, _session) = registry_a.create_operation("cli".into(), 1).await.unwrap();
    let op_id = initiator.core.op_id().clone();

    let lock_path = oplg_storage::paths::lock_path(dir.path(), &op_id);
    std::fs::write(
        &lock_path,
        serde_json::json!({"participantId": "ghost", "pid": 9999, "timestamp": "2000-01-01T00:00:00.000Z"})
            .to_string(),
    )
    .unwrap();
    let old = std::time::SystemTime::now() - Duration::from_secs(10);
    std::fs::OpenOptions::new().write(true).open(&lock_path).unwrap().set_modified(old).unwrap();

    let registry_b = LedgerRegistry::new(dir.path(), config, clock).unwrap();
    let joined = tokio::time::timeout(
        Duration::from_secs(3),
        registry_b.join_operation(op_id, "bridge".into(), 2),
    )
    .await
    .unwrap();
    assert!(joined.is_ok());
    assert!(!lock_path.exists());
}

/// Testable property: two sessions for the same `(operation, participant)`
/// pair in one process share the single in-process heartbeat engine, and
/// only the last `leave` actually tears the operation out of the registry.
#[tokio::test]
async fn property_shared_heartbeat_survives_until_the_last_session_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let registry = LedgerRegistry::new(dir.path(), LedgerConfig::default(), clock).unwrap();

    let (first, first_session) = registry.create_operation("cli".into(), 1).await.unwrap();
    let op_id = first.core.op_id().clone();
    let (second, second_session) =
        registry.join_operation(op_id.clone(), "cli".into(), 1).await.unwrap();

    assert!(std::ptr::eq(first.heartbeat.as_ref(), second.heartbeat.as_ref()));
    assert_ne!(first_session, second_session);

    registry.leave(&op_id, &"cli".into(), first_session, false).unwrap();
    assert!(registry.operation(&op_id, &"cli".into()).is_some());

    registry.leave(&op_id, &"cli".into(), second_session, false).unwrap();
    assert!(registry.operation(&op_id, &"cli".into()).is_none());
}
