// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archival rename on completion and backup retention (`cleanOldBackups`).

use std::io;
use std::path::Path;

use oplg_core::OperationId;

use crate::paths;

/// Rename the three per-operation files under `backup/<opId>/`. A missing
/// source file (e.g. the debug log was never written) is not an error —
/// only what exists is archived.
pub fn archive(base_dir: &Path, op_id: &OperationId) -> io::Result<()> {
    let dest_dir = paths::backup_dir(base_dir, op_id);
    std::fs::create_dir_all(&dest_dir)?;

    rename_if_exists(&paths::state_path(base_dir, op_id), &paths::backup_state_path(base_dir, op_id))?;
    rename_if_exists(&paths::log_path(base_dir, op_id), &paths::backup_log_path(base_dir, op_id))?;
    rename_if_exists(&paths::debug_log_path(base_dir, op_id), &paths::backup_debug_log_path(base_dir, op_id))?;
    Ok(())
}

fn rename_if_exists(src: &Path, dst: &Path) -> io::Result<()> {
    if src.exists() {
        std::fs::rename(src, dst)?;
    }
    Ok(())
}

/// Delete the oldest backup folders until at most `max_backups` remain.
/// Folder names are timestamp-prefixed operation ids, so lexicographic
/// order is chronological order.
pub fn clean_old_backups(base_dir: &Path, max_backups: usize) -> io::Result<()> {
    let backups_root = paths::backups_root(base_dir);
    if !backups_root.exists() {
        return Ok(());
    }

    let mut names: Vec<String> = std::fs::read_dir(&backups_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    if names.len() > max_backups {
        let overflow = names.len() - max_backups;
        for name in names.into_iter().take(overflow) {
            let _ = std::fs::remove_dir_all(backups_root.join(name));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
