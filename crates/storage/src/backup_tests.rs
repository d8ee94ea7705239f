// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn archive_moves_all_three_files() {
    let dir = tempfile::tempdir().unwrap();
    let op_id: OperationId = "op-1".into();
    std::fs::write(paths::state_path(dir.path(), &op_id), "{}").unwrap();
    std::fs::write(paths::log_path(dir.path(), &op_id), "log\n").unwrap();
    std::fs::write(paths::debug_log_path(dir.path(), &op_id), "debug\n").unwrap();

    archive(dir.path(), &op_id).unwrap();

    assert!(!paths::state_path(dir.path(), &op_id).exists());
    assert!(paths::backup_state_path(dir.path(), &op_id).exists());
    assert!(paths::backup_log_path(dir.path(), &op_id).exists());
    assert!(paths::backup_debug_log_path(dir.path(), &op_id).exists());
}

#[test]
fn archive_tolerates_missing_debug_log() {
    let dir = tempfile::tempdir().unwrap();
    let op_id: OperationId = "op-1".into();
    std::fs::write(paths::state_path(dir.path(), &op_id), "{}").unwrap();
    std::fs::write(paths::log_path(dir.path(), &op_id), "log\n").unwrap();

    archive(dir.path(), &op_id).unwrap();

    assert!(paths::backup_state_path(dir.path(), &op_id).exists());
    assert!(!paths::backup_debug_log_path(dir.path(), &op_id).exists());
}

#[test]
fn clean_old_backups_is_noop_when_under_limit() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["20260101T00-00-00.000-cli-a", "20260102T00-00-00.000-cli-b"] {
        std::fs::create_dir_all(paths::backups_root(dir.path()).join(name)).unwrap();
    }
    clean_old_backups(dir.path(), 20).unwrap();
    assert_eq!(std::fs::read_dir(paths::backups_root(dir.path())).unwrap().count(), 2);
}

#[test]
fn clean_old_backups_deletes_oldest_lexicographic_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let names = [
        "20260101T00-00-00.000-cli-a",
        "20260102T00-00-00.000-cli-b",
        "20260103T00-00-00.000-cli-c",
        "20260104T00-00-00.000-cli-d",
    ];
    for name in names {
        std::fs::create_dir_all(paths::backups_root(dir.path()).join(name)).unwrap();
    }

    clean_old_backups(dir.path(), 2).unwrap();

    let remaining = paths::backups_root(dir.path());
    assert!(!remaining.join(names[0]).exists());
    assert!(!remaining.join(names[1]).exists());
    assert!(remaining.join(names[2]).exists());
    assert!(remaining.join(names[3]).exists());
}

#[test]
fn clean_old_backups_on_missing_root_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    clean_old_backups(dir.path(), 20).unwrap();
}
