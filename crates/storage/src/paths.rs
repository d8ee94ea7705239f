// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem layout under `basePath`.

use std::path::{Path, PathBuf};

use oplg_core::OperationId;

pub fn state_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    base_dir.join(format!("{op_id}.operation.json"))
}

pub fn lock_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    base_dir.join(format!("{op_id}.operation.json.lock"))
}

pub fn log_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    base_dir.join(format!("{op_id}.operation.log"))
}

pub fn debug_log_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    base_dir.join(format!("{op_id}.operation.debug.log"))
}

pub fn trail_dir(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    base_dir.join(format!("{op_id}_trail"))
}

pub fn trail_entry_path(base_dir: &Path, op_id: &OperationId, elapsed_label: &str) -> PathBuf {
    trail_dir(base_dir, op_id).join(format!("{elapsed_label}_{op_id}.json"))
}

pub fn backups_root(base_dir: &Path) -> PathBuf {
    base_dir.join("backup")
}

pub fn backup_dir(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    backups_root(base_dir).join(op_id.as_str())
}

pub fn backup_state_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    backup_dir(base_dir, op_id).join("operation.json")
}

pub fn backup_log_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    backup_dir(base_dir, op_id).join("operation.log")
}

pub fn backup_debug_log_path(base_dir: &Path, op_id: &OperationId) -> PathBuf {
    backup_dir(base_dir, op_id).join("operation.debug.log")
}
