// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oplg_core::{CallFrameBuilder, FakeClock, Operation, OperationBuilder};
use std::time::{Duration, SystemTime};

fn participant(s: &str) -> ParticipantId {
    ParticipantId::from(s)
}

fn write_operation(path: &std::path::Path, operation: &Operation) {
    std::fs::write(path, serde_json::to_vec_pretty(operation).unwrap()).unwrap();
}

#[tokio::test]
async fn acquire_then_release_removes_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("op.lock");
    let state_path = dir.path().join("op.json");
    let manager = LockManager::new(LockConfig::default(), FakeClock::new());

    let guard = manager.acquire(&lock_path, &state_path, &participant("cli"), 1).await.unwrap();
    assert!(lock_path.exists());
    guard.release();
    assert!(!lock_path.exists());
}

#[tokio::test]
async fn second_acquire_fails_while_fresh_lock_held_and_deadline_passed() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("op.lock");
    let state_path = dir.path().join("op.json");
    let config = LockConfig {
        lock_timeout: Duration::from_millis(100),
        lock_retry_interval: Duration::from_millis(10),
        max_lock_retry_interval: Duration::from_millis(10),
        stale_threshold: Duration::from_secs(15),
    };
    // Real `SystemClock` here: the lock's mtime is a real filesystem
    // timestamp, so the deadline and staleness checks need to share the same
    // time source to resolve deterministically within this test's small
    // real-time budget.
    let manager = LockManager::new(config, oplg_core::SystemClock);

    // Hold the lock without a guard so it isn't released.
    let _held = manager.acquire(&lock_path, &state_path, &participant("cli"), 1).await.unwrap();

    let result = manager.acquire(&lock_path, &state_path, &participant("bridge"), 2).await;
    assert!(matches!(result, Err(StoreError::LockFailed)));
}

#[tokio::test]
async fn stale_lock_with_no_owner_frames_is_orphaned_and_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("op.lock");
    let state_path = dir.path().join("op.json");

    let operation = OperationBuilder::new("op-1", "cli").build();
    write_operation(&state_path, &operation);

    // Write a lock file whose mtime is already old relative to lockTimeout.
    std::fs::write(
        &lock_path,
        serde_json::to_vec(&LockContentsForTest { participant_id: "cli".into(), pid: 999, timestamp: "t0".into() })
            .unwrap(),
    )
    .unwrap();
    set_mtime_seconds_ago(&lock_path, 5);

    let config = LockConfig {
        lock_timeout: Duration::from_secs(2),
        lock_retry_interval: Duration::from_millis(10),
        max_lock_retry_interval: Duration::from_millis(10),
        stale_threshold: Duration::from_secs(15),
    };
    let manager = LockManager::new(config, FakeClock::new());

    let guard = manager.acquire(&lock_path, &state_path, &participant("newcomer"), 1).await.unwrap();
    guard.release();
}

#[tokio::test]
async fn stale_lock_with_all_owner_frames_stale_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("op.lock");
    let state_path = dir.path().join("op.json");

    let stale_frame = CallFrameBuilder::new("cli", "call_cli_1_a").last_heartbeat(oplg_core::format_iso8601(0)).build();
    let operation = OperationBuilder::new("op-1", "cli").with_frame(stale_frame).build();
    write_operation(&state_path, &operation);

    std::fs::write(
        &lock_path,
        serde_json::to_vec(&LockContentsForTest { participant_id: "cli".into(), pid: 999, timestamp: "t0".into() })
            .unwrap(),
    )
    .unwrap();
    set_mtime_seconds_ago(&lock_path, 5);

    let config = LockConfig {
        lock_timeout: Duration::from_secs(2),
        lock_retry_interval: Duration::from_millis(10),
        max_lock_retry_interval: Duration::from_millis(10),
        stale_threshold: Duration::from_secs(15),
    };
    // FakeClock starts at epoch 1_700_000_000_000, far past the stale
    // frame's heartbeat at epoch 0, so the owner is considered crashed.
    let manager = LockManager::new(config, FakeClock::new());

    let guard = manager.acquire(&lock_path, &state_path, &participant("newcomer"), 1).await.unwrap();
    guard.release();
}

#[tokio::test]
async fn lock_not_reclaimed_while_owner_has_a_live_frame() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("op.lock");
    let state_path = dir.path().join("op.json");

    let live_frame = CallFrameBuilder::new("cli", "call_cli_1_a")
        .last_heartbeat(oplg_core::SystemClock.now_iso8601())
        .build();
    let operation = OperationBuilder::new("op-1", "cli").with_frame(live_frame).build();
    write_operation(&state_path, &operation);

    std::fs::write(
        &lock_path,
        serde_json::to_vec(&LockContentsForTest { participant_id: "cli".into(), pid: 999, timestamp: "t0".into() })
            .unwrap(),
    )
    .unwrap();
    set_mtime_seconds_ago(&lock_path, 5);

    let config = LockConfig {
        lock_timeout: Duration::from_millis(50),
        lock_retry_interval: Duration::from_millis(10),
        max_lock_retry_interval: Duration::from_millis(10),
        stale_threshold: Duration::from_secs(15),
    };
    // Real clock: the mtime check is a real filesystem timestamp and the
    // retry deadline needs to elapse in wall-clock time for this test to
    // terminate.
    let manager = LockManager::new(config, oplg_core::SystemClock);

    let result = manager.acquire(&lock_path, &state_path, &participant("newcomer"), 1).await;
    assert!(matches!(result, Err(StoreError::LockFailed)));
}

// Mirrors the private `LockContents` shape so tests can write fixture lock
// files without exposing the type outside the module.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct LockContentsForTest {
    participant_id: String,
    pid: u32,
    timestamp: String,
}

// Uses `File::set_modified` (stable since 1.75) rather than pulling in the
// `filetime` crate for this one test helper.
fn set_mtime_seconds_ago(path: &std::path::Path, seconds_ago: u64) {
    let past = SystemTime::now() - Duration::from_secs(seconds_ago);
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(past).unwrap();
}
