// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent state store: read/modify/write the operation JSON blob under
//! lock, with a trail snapshot written before every mutation (C2, spec
//! §4.2).

use std::path::{Path, PathBuf};

use oplg_core::{Clock, Operation, OperationId, ParticipantId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::lock::{LockConfig, LockGuard, LockManager};
use crate::paths;

pub struct PersistentStateStore<C: Clock> {
    base_dir: PathBuf,
    lock_manager: LockManager<C>,
}

impl<C: Clock> PersistentStateStore<C> {
    pub fn new(base_dir: impl Into<PathBuf>, lock_config: LockConfig, clock: C) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { lock_manager: LockManager::new(lock_config, clock), base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Write the initial state file for a freshly-created operation.
    pub async fn create(
        &self,
        op_id: &OperationId,
        participant_id: &ParticipantId,
        pid: u32,
        operation: &Operation,
    ) -> StoreResult<()> {
        let state_path = paths::state_path(&self.base_dir, op_id);
        let lock_path = paths::lock_path(&self.base_dir, op_id);
        let guard = self.lock_manager.acquire(&lock_path, &state_path, participant_id, pid).await?;
        write_operation_file(&state_path, operation)?;
        guard.release();
        Ok(())
    }

    /// Acquire the lock, read and parse the state file, release the lock.
    /// Returns `None` if no state file exists for `op_id`.
    pub async fn read(
        &self,
        op_id: &OperationId,
        participant_id: &ParticipantId,
        pid: u32,
    ) -> StoreResult<Option<Operation>> {
        let state_path = paths::state_path(&self.base_dir, op_id);
        if !state_path.exists() {
            return Ok(None);
        }
        let lock_path = paths::lock_path(&self.base_dir, op_id);
        let guard = self.lock_manager.acquire(&lock_path, &state_path, participant_id, pid).await?;
        let operation = read_operation_file(&state_path)?;
        guard.release();
        Ok(Some(operation))
    }

    /// Acquire the lock; if the state file is absent, fail with
    /// `OperationMissing`; snapshot the current state to the trail
    /// directory; apply `updater` to a parsed copy; write it back; release
    /// the lock. Returns the updated operation.
    pub async fn modify(
        &self,
        op_id: &OperationId,
        participant_id: &ParticipantId,
        pid: u32,
        elapsed_label: &str,
        updater: impl FnOnce(&mut Operation),
    ) -> StoreResult<Operation> {
        let state_path = paths::state_path(&self.base_dir, op_id);
        let lock_path = paths::lock_path(&self.base_dir, op_id);
        let guard = self.lock_manager.acquire(&lock_path, &state_path, participant_id, pid).await?;

        let result = (|| {
            if !state_path.exists() {
                return Err(StoreError::OperationMissing);
            }
            let mut operation = read_operation_file(&state_path)?;
            self.write_trail_snapshot(op_id, elapsed_label, &operation)?;
            updater(&mut operation);
            write_operation_file(&state_path, &operation)?;
            Ok(operation)
        })();

        guard.release();
        result
    }

    /// Low-level handshake for multi-step mutation sequences (e.g.
    /// `complete()`'s rename-to-backup flow): acquire the lock and return
    /// the parsed state plus a guard the caller holds across its own steps.
    pub async fn retrieve_and_lock(
        &self,
        op_id: &OperationId,
        participant_id: &ParticipantId,
        pid: u32,
    ) -> StoreResult<(Operation, LockGuard)> {
        let state_path = paths::state_path(&self.base_dir, op_id);
        let lock_path = paths::lock_path(&self.base_dir, op_id);
        let guard = self.lock_manager.acquire(&lock_path, &state_path, participant_id, pid).await?;
        if !state_path.exists() {
            guard.release();
            return Err(StoreError::OperationMissing);
        }
        let operation = read_operation_file(&state_path)?;
        Ok((operation, guard))
    }

    /// Trail-snapshot the current on-disk state, then write `operation` back
    /// and release `guard`. Pairs with [`Self::retrieve_and_lock`].
    pub fn write_and_unlock(
        &self,
        op_id: &OperationId,
        elapsed_label: &str,
        operation: &Operation,
        guard: LockGuard,
    ) -> StoreResult<()> {
        let state_path = paths::state_path(&self.base_dir, op_id);
        if let Ok(current) = read_operation_file(&state_path) {
            self.write_trail_snapshot(op_id, elapsed_label, &current)?;
        }
        write_operation_file(&state_path, operation)?;
        guard.release();
        Ok(())
    }

    /// Release a lock acquired via [`Self::retrieve_and_lock`] without
    /// writing (e.g. a read-only multi-step inspection).
    pub fn unlock(&self, guard: LockGuard) {
        guard.release();
    }

    fn write_trail_snapshot(&self, op_id: &OperationId, elapsed_label: &str, operation: &Operation) -> StoreResult<()> {
        let dir = paths::trail_dir(&self.base_dir, op_id);
        std::fs::create_dir_all(&dir)?;

        let mut label = elapsed_label.to_string();
        let mut path = paths::trail_entry_path(&self.base_dir, op_id, &label);
        let mut suffix = 1u32;
        while path.exists() {
            label = format!("{elapsed_label}_{suffix}");
            path = paths::trail_entry_path(&self.base_dir, op_id, &label);
            suffix += 1;
        }

        debug!(trail = %path.display(), "writing trail snapshot");
        let json = serde_json::to_vec_pretty(operation)?;
        std::fs::write(&path, json)?;
        Ok(())
    }
}

fn read_operation_file(path: &Path) -> StoreResult<Operation> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_operation_file(path: &Path, operation: &Operation) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(operation)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
