// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::core::OperationCore;
use oplg_core::{FakeClock, OperationBuilder, OperationId};
use oplg_storage::{LockConfig, PersistentStateStore};
use std::time::Duration;

async fn core_for(dir: &tempfile::TempDir, op_id: &str) -> Arc<OperationCore<FakeClock>> {
    let clock = FakeClock::new();
    let store = Arc::new(PersistentStateStore::new(dir.path(), LockConfig::default(), clock.clone()).unwrap());
    let op_id = OperationId::parse(op_id).unwrap();
    let operation = OperationBuilder::new(op_id.clone(), "cli").build();
    store.create(&op_id, &"cli".into(), 1, &operation).await.unwrap();
    Arc::new(OperationCore::new(op_id, "cli".into(), 1, operation, store, clock, 20))
}

#[tokio::test]
async fn successful_spawn_call_is_categorized_successful_by_sync() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_for(&dir, "op-1").await;

    let call = core
        .spawn_call(None, true, |_cancel| async { Ok::<_, String>(42) })
        .await
        .unwrap();

    let result = core.sync(std::slice::from_ref(&call)).await;
    assert!(result.all_succeeded());
    assert_eq!(result.successful, vec![call.call_id().clone()]);
    assert!(call.succeeded());
}

#[tokio::test]
async fn failed_spawn_call_with_fail_on_crash_signals_operation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_for(&dir, "op-1").await;

    let call = core
        .spawn_call(None, true, |_cancel| async { Err::<(), _>("boom".to_string()) })
        .await
        .unwrap();

    let result = core.sync(std::slice::from_ref(&call)).await;
    assert!(!result.all_succeeded());
    assert_eq!(result.failed, vec![call.call_id().clone()]);
    assert!(result.operation_failed);
    assert!(!call.succeeded());
}

#[tokio::test]
async fn sync_marks_pending_calls_unknown_when_operation_fails_first() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_for(&dir, "op-1").await;

    let slow: SpawnedCall<()> = core
        .spawn_call(None, true, |cancel| async move {
            loop {
                if cancel.is_canceled() {
                    return Err("canceled".to_string());
                }
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        })
        .await
        .unwrap();
    let slow_id = slow.call_id().clone();
    let failing: SpawnedCall<()> = core
        .spawn_call(None, true, |_cancel| async { Err("crash".to_string()) })
        .await
        .unwrap();

    let result = core.sync(&[slow, failing]).await;
    assert!(result.operation_failed);
    assert_eq!(result.unknown, vec![slow_id]);
    assert_eq!(result.failed.len(), 1);
}

#[tokio::test]
async fn cancel_sets_flag_and_invokes_callback_once() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_for(&dir, "op-1").await;

    let call = core
        .spawn_call(None, false, |cancel| async move {
            while !cancel.is_canceled() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Ok::<_, String>(())
        })
        .await
        .unwrap();

    let invoked = Arc::new(AtomicBool::new(false));
    let invoked_clone = Arc::clone(&invoked);
    call.set_cancel_callback(move || invoked_clone.store(true, Ordering::SeqCst));

    call.cancel();
    assert!(invoked.load(Ordering::SeqCst));
    call.cancel();

    call.wait().await.unwrap();
}

#[tokio::test]
async fn kill_without_subprocess_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_for(&dir, "op-1").await;

    let call = core.spawn_call(None, true, |_cancel| async { Ok::<_, String>(()) }).await.unwrap();
    assert!(!call.kill());
    call.wait().await.unwrap();
}

#[tokio::test]
async fn wait_for_completion_returns_completed_when_no_failure() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_for(&dir, "op-1").await;

    let outcome = core.wait_for_completion(async { Ok::<_, String>(7) }).await;
    match outcome {
        CompletionOutcome::Completed(Ok(v)) => assert_eq!(v, 7),
        _ => panic!("expected Completed(Ok(7))"),
    }
}
