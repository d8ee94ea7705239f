// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oplg_core::{FakeClock, OperationBuilder, OperationState};

fn store(dir: &tempfile::TempDir) -> PersistentStateStore<FakeClock> {
    PersistentStateStore::new(dir.path(), LockConfig::default(), FakeClock::new()).unwrap()
}

#[tokio::test]
async fn read_missing_operation_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let result = store.read(&"op-1".into(), &"cli".into(), 1).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn create_then_read_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let op_id: OperationId = "op-1".into();
    let operation = OperationBuilder::new(op_id.clone(), "cli").build();

    store.create(&op_id, &"cli".into(), 1, &operation).await.unwrap();
    let read_back = store.read(&op_id, &"cli".into(), 1).await.unwrap().unwrap();
    assert_eq!(read_back.operation_id, op_id);
    assert_eq!(read_back.operation_state, OperationState::Running);
}

#[tokio::test]
async fn modify_on_missing_operation_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let result = store.modify(&"op-1".into(), &"cli".into(), 1, "000.000", |_| {}).await;
    assert!(matches!(result, Err(StoreError::OperationMissing)));
}

#[tokio::test]
async fn modify_writes_trail_snapshot_of_pre_mutation_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let op_id: OperationId = "op-1".into();
    let operation = OperationBuilder::new(op_id.clone(), "cli").build();
    store.create(&op_id, &"cli".into(), 1, &operation).await.unwrap();

    let updated = store
        .modify(&op_id, &"cli".into(), 1, "000.100", |op| {
            op.operation_state = OperationState::Cleanup;
        })
        .await
        .unwrap();
    assert_eq!(updated.operation_state, OperationState::Cleanup);

    let trail_dir = paths::trail_dir(dir.path(), &op_id);
    let entries: Vec<_> = std::fs::read_dir(&trail_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);

    let trail_path = paths::trail_entry_path(dir.path(), &op_id, "000.100");
    let trail_contents = std::fs::read_to_string(trail_path).unwrap();
    let trail_operation: Operation = serde_json::from_str(&trail_contents).unwrap();
    assert_eq!(trail_operation.operation_state, OperationState::Running);
}

#[tokio::test]
async fn modify_twice_with_same_label_disambiguates_trail_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let op_id: OperationId = "op-1".into();
    let operation = OperationBuilder::new(op_id.clone(), "cli").build();
    store.create(&op_id, &"cli".into(), 1, &operation).await.unwrap();

    store.modify(&op_id, &"cli".into(), 1, "000.100", |_| {}).await.unwrap();
    store.modify(&op_id, &"cli".into(), 1, "000.100", |_| {}).await.unwrap();

    assert!(paths::trail_entry_path(dir.path(), &op_id, "000.100").exists());
    assert!(paths::trail_entry_path(dir.path(), &op_id, "000.100_1").exists());
}

#[tokio::test]
async fn retrieve_and_lock_then_write_and_unlock_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let op_id: OperationId = "op-1".into();
    let operation = OperationBuilder::new(op_id.clone(), "cli").build();
    store.create(&op_id, &"cli".into(), 1, &operation).await.unwrap();

    let (mut loaded, guard) = store.retrieve_and_lock(&op_id, &"cli".into(), 1).await.unwrap();
    loaded.aborted = true;
    store.write_and_unlock(&op_id, "000.200", &loaded, guard).unwrap();

    let read_back = store.read(&op_id, &"cli".into(), 1).await.unwrap().unwrap();
    assert!(read_back.aborted);
}

#[tokio::test]
async fn retrieve_and_lock_on_missing_operation_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let op_id: OperationId = "op-1".into();

    let result = store.retrieve_and_lock(&op_id, &"cli".into(), 1).await;
    assert!(matches!(result, Err(StoreError::OperationMissing)));

    // The lock must have been released on the missing-operation path, or a
    // subsequent `create` would hang waiting for a lock nobody holds.
    store.create(&op_id, &"cli".into(), 1, &OperationBuilder::new(op_id.clone(), "cli").build()).await.unwrap();
}
