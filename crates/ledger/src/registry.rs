// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Ledger Registry (C7): owns the base and backup
//! directories, instantiates and routes operations, and runs a background
//! watchdog over every live operation in the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oplg_core::{
    parse_iso8601_ms, Clock, LedgerError, LedgerResult, Operation, OperationId, ParticipantId,
};
use oplg_storage::{PersistentStateStore, StoreError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::core::OperationCore;
use crate::heartbeat::HeartbeatEngine;
use crate::session::SessionRegistry;

fn map_store_err(op_id: &OperationId, err: StoreError) -> LedgerError {
    match err {
        StoreError::OperationMissing => LedgerError::LedgerNotFound(op_id.clone()),
        StoreError::LockFailed => LedgerError::LockFailed(op_id.clone()),
        StoreError::Io(io) => LedgerError::Io(io),
        StoreError::Json(json) => LedgerError::Json(json),
    }
}

/// One operation as seen by one `(operationId, participantId)` pair inside
/// this process: the Operation Core it mutates through, the Heartbeat
/// Engine refcounted by its Session Registry's join count, and the Session
/// Registry itself.
///
/// Keyed by `(OperationId, ParticipantId)` rather than `OperationId` alone
/// so one process can host more than one local identity against the same
/// operation — the shape the remote gateway (C8) needs, since every HTTP
/// request supplies its own caller identity rather than sharing the
/// server process's own.
pub struct ManagedOperation<C: Clock> {
    pub core: Arc<OperationCore<C>>,
    pub heartbeat: Arc<HeartbeatEngine<C>>,
    pub sessions: Arc<SessionRegistry<C>>,
}

type OperationMap<C> = HashMap<(OperationId, ParticipantId), Arc<ManagedOperation<C>>>;

/// Instantiates, routes, and watches every operation this process
/// participates in (C7). Construct one per process pointed at a shared
/// `basePath` directory.
pub struct LedgerRegistry<C: Clock> {
    config: LedgerConfig,
    store: Arc<PersistentStateStore<C>>,
    clock: C,
    operations: Mutex<OperationMap<C>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> LedgerRegistry<C> {
    pub fn new(base_dir: impl Into<PathBuf>, config: LedgerConfig, clock: C) -> std::io::Result<Arc<Self>> {
        let base_dir = base_dir.into();
        let store = Arc::new(PersistentStateStore::new(&base_dir, config.lock_config(), clock.clone())?);
        Ok(Arc::new(Self {
            config,
            store,
            clock,
            operations: Mutex::new(HashMap::new()),
            watchdog: Mutex::new(None),
        }))
    }

    pub fn base_dir(&self) -> &Path {
        self.store.base_dir()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Generate a fresh operation id: `YYYYMMDDTHH:MM:SS.sss-<participantId>-<hex8>`,
    /// canonicalized to `-` for filesystem portability.
    fn generate_operation_id(&self, participant: &ParticipantId) -> OperationId {
        let hex8 = oplg_core::random_hex(8);
        OperationId::generate(self.clock.epoch_ms(), participant, &hex8)
    }

    fn instantiate(
        &self,
        op_id: OperationId,
        participant_id: ParticipantId,
        pid: u32,
        operation: Operation,
    ) -> Arc<ManagedOperation<C>> {
        let core = Arc::new(OperationCore::new(
            op_id,
            participant_id,
            pid,
            operation,
            Arc::clone(&self.store),
            self.clock.clone(),
            self.config.max_backups,
        ));
        let heartbeat = Arc::new(HeartbeatEngine::new(
            Arc::clone(&core),
            self.clock.clone(),
            self.config.staleness_threshold_ms,
        ));
        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&core),
            Arc::clone(&heartbeat),
            self.config.heartbeat_interval,
            self.config.heartbeat_jitter.as_millis() as u64,
        ));
        Arc::new(ManagedOperation { core, heartbeat, sessions })
    }

    /// Create a brand-new operation, initiated by `participant_id` (spec
    /// §3 lifecycle: "created by initiator"). Returns the managed operation
    /// and the first session id.
    pub async fn create_operation(
        &self,
        participant_id: ParticipantId,
        pid: u32,
    ) -> LedgerResult<(Arc<ManagedOperation<C>>, u64)> {
        let op_id = self.generate_operation_id(&participant_id);
        let now_iso = self.clock.now_iso8601();
        let operation = Operation::new(op_id.clone(), participant_id.clone(), now_iso);
        self.store
            .create(&op_id, &participant_id, pid, &operation)
            .await
            .map_err(|e| map_store_err(&op_id, e))?;

        let managed = self.instantiate(op_id.clone(), participant_id.clone(), pid, operation);
        let session = managed.sessions.new_session();
        self.operations.lock().insert((op_id.clone(), participant_id), Arc::clone(&managed));
        info!(operation = %op_id, "operation created");
        Ok((managed, session))
    }

    /// Join an existing operation as `participant_id`. Reuses the in-process
    /// [`ManagedOperation`] if this `(op_id, participant_id)` pair is
    /// already live (a second session in the same process), otherwise
    /// reads the on-disk state and instantiates a fresh one.
    pub async fn join_operation(
        &self,
        op_id: OperationId,
        participant_id: ParticipantId,
        pid: u32,
    ) -> LedgerResult<(Arc<ManagedOperation<C>>, u64)> {
        let key = (op_id.clone(), participant_id.clone());
        if let Some(managed) = self.operations.lock().get(&key).cloned() {
            let session = managed.sessions.new_session();
            return Ok((managed, session));
        }

        let operation = self
            .store
            .read(&op_id, &participant_id, pid)
            .await
            .map_err(|e| map_store_err(&op_id, e))?
            .ok_or_else(|| LedgerError::LedgerNotFound(op_id.clone()))?;

        let managed = self.instantiate(op_id.clone(), participant_id.clone(), pid, operation);
        let session = managed.sessions.new_session();
        self.operations.lock().insert(key, Arc::clone(&managed));
        info!(operation = %op_id, participant = %participant_id, "operation joined");
        Ok((managed, session))
    }

    fn managed(&self, op_id: &OperationId, participant_id: &ParticipantId) -> LedgerResult<Arc<ManagedOperation<C>>> {
        self.operations
            .lock()
            .get(&(op_id.clone(), participant_id.clone()))
            .cloned()
            .ok_or_else(|| LedgerError::LedgerNotFound(op_id.clone()))
    }

    pub fn operation(&self, op_id: &OperationId, participant_id: &ParticipantId) -> Option<Arc<ManagedOperation<C>>> {
        self.operations.lock().get(&(op_id.clone(), participant_id.clone())).cloned()
    }

    /// Leave a session: if this was the last live session for
    /// the `(op_id, participant_id)` pair, the [`ManagedOperation`] is
    /// dropped from the registry's map entirely.
    pub fn leave(
        &self,
        op_id: &OperationId,
        participant_id: &ParticipantId,
        session: u64,
        cancel_pending_calls: bool,
    ) -> LedgerResult<()> {
        let managed = self.managed(op_id, participant_id)?;
        let now_empty = managed.sessions.leave(session, cancel_pending_calls)?;
        if now_empty {
            self.operations.lock().remove(&(op_id.clone(), participant_id.clone()));
        }
        Ok(())
    }

    /// Complete the operation (initiator-only) and unregister it
    /// from this process's map.
    pub async fn complete(&self, op_id: &OperationId, participant_id: &ParticipantId) -> LedgerResult<()> {
        let managed = self.managed(op_id, participant_id)?;
        managed.core.complete().await?;
        managed.heartbeat.stop();
        self.operations.lock().remove(&(op_id.clone(), participant_id.clone()));
        Ok(())
    }

    /// Start the background watchdog: every `heartbeatInterval`, iterates
    /// over all live operations and emits `HeartbeatStale` or
    /// `LedgerNotFound` as appropriate. Idempotent; a second call is a
    /// no-op.
    pub fn start_watchdog(self: &Arc<Self>) {
        if self.watchdog.lock().is_some() {
            return;
        }
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            registry.watchdog_loop().await;
        });
        *self.watchdog.lock() = Some(handle);
    }

    async fn watchdog_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.heartbeat_interval).await;
            let snapshot: Vec<_> = self.operations.lock().values().cloned().collect();
            let stale_threshold_ms = self.config.stale_lock_threshold.as_millis() as u64;
            for managed in snapshot {
                let operation = managed.core.snapshot();
                let op_id = operation.operation_id.clone();
                let last_hb_ms = match parse_iso8601_ms(&operation.last_heartbeat) {
                    Some(ms) => ms,
                    None => {
                        warn!(operation = %op_id, "watchdog: operation ledger not found or unparseable");
                        continue;
                    }
                };
                let age_ms = self.clock.epoch_ms().saturating_sub(last_hb_ms);
                if age_ms > stale_threshold_ms {
                    warn!(operation = %op_id, age_ms, "watchdog: heartbeat stale");
                }
            }
        }
    }

    /// Stop every owned heartbeat engine, abort the watchdog task, and
    /// clear the operations map. Idempotent.
    pub fn shutdown(&self) {
        for (_, managed) in self.operations.lock().drain() {
            managed.heartbeat.stop();
        }
        if let Some(handle) = self.watchdog.lock().take() {
            handle.abort();
        }
    }
}

impl<C: Clock> Drop for LedgerRegistry<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
