// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Operation Core (C3): the single mutation surface a given
//! operation's calls, temp resources, abort flag, and logs route through.
//! Every mutating method snapshots the current elapsed-time label, asks
//! [`PersistentStateStore`] to trail-snapshot and write back under lock, and
//! refreshes the in-memory cache so reads between mutations are cheap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use oplg_core::{
    CallFrame, Clock, LedgerError, LedgerResult, Operation, OperationFailure, OperationId,
    ParticipantId, TempResource,
};
use oplg_storage::{PersistentStateStore, StoreError};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::log::{self, LogLevel};
use oplg_core::CallId;
use oplg_storage::paths;

fn map_store_err(op_id: &OperationId, err: StoreError) -> LedgerError {
    match err {
        StoreError::OperationMissing => LedgerError::LedgerNotFound(op_id.clone()),
        StoreError::LockFailed => LedgerError::LockFailed(op_id.clone()),
        StoreError::Io(io) => LedgerError::Io(io),
        StoreError::Json(json) => LedgerError::Json(json),
    }
}

/// A handle to a call started through [`OperationCore::start_call`].
///
/// Ending or failing the same handle twice returns [`LedgerError::AlreadyCompleted`]
/// without touching the core at all — the idempotency guard lives on the
/// handle, not on the call id, because the id-based [`OperationCore::end_call`]/
/// [`OperationCore::fail_call`] primitives are also reachable directly (by
/// the remote gateway, which only ever has a string id) and there the
/// question is "does this id exist" (`UnknownCall`), not "was this handle
/// already used".
pub struct ActiveCall {
    call_id: CallId,
    fail_on_crash: bool,
    completed: AtomicBool,
}

impl ActiveCall {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn fail_on_crash(&self) -> bool {
        self.fail_on_crash
    }

    /// Whether `end`/`fail` has already been called on this handle. Used by
    /// the session registry's pending-call views; does not reflect whether
    /// the frame still exists on disk for other reasons.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    fn mark_completed(&self) -> LedgerResult<()> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return Err(LedgerError::AlreadyCompleted(self.call_id.clone()));
        }
        Ok(())
    }
}

pub struct OperationCore<C: Clock> {
    op_id: OperationId,
    participant_id: ParticipantId,
    pid: u32,
    clock: C,
    store: Arc<PersistentStateStore<C>>,
    max_backups: usize,
    cached: Mutex<Operation>,
    call_counter: AtomicU64,
    start_instant: std::time::Instant,
    aborted_locally: AtomicBool,
    abort_notify: Notify,
    failure_tx: watch::Sender<Option<OperationFailure>>,
}

impl<C: Clock> OperationCore<C> {
    pub fn new(
        op_id: OperationId,
        participant_id: ParticipantId,
        pid: u32,
        operation: Operation,
        store: Arc<PersistentStateStore<C>>,
        clock: C,
        max_backups: usize,
    ) -> Self {
        let (failure_tx, _rx) = watch::channel(None);
        let start_instant = clock.now();
        Self {
            op_id,
            participant_id,
            pid,
            clock,
            store,
            max_backups,
            cached: Mutex::new(operation),
            call_counter: AtomicU64::new(0),
            start_instant,
            aborted_locally: AtomicBool::new(false),
            abort_notify: Notify::new(),
            failure_tx,
        }
    }

    pub fn op_id(&self) -> &OperationId {
        &self.op_id
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub(crate) fn now_iso8601(&self) -> String {
        self.clock.now_iso8601()
    }

    pub(crate) fn epoch_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    pub fn initiator_id(&self) -> ParticipantId {
        self.cached.lock().initiator_id.clone()
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator_id() == self.participant_id
    }

    /// A clone of the current in-memory cached state. May lag the on-disk
    /// state briefly if another process mutated it since the last refresh.
    pub fn snapshot(&self) -> Operation {
        self.cached.lock().clone()
    }

    /// Re-read the state file and refresh the cache, picking up mutations
    /// made by other participants (used by the heartbeat engine and the
    /// registry watchdog).
    pub async fn refresh(&self) -> LedgerResult<Operation> {
        let operation = self
            .store
            .read(&self.op_id, &self.participant_id, self.pid)
            .await
            .map_err(|e| map_store_err(&self.op_id, e))?
            .ok_or_else(|| LedgerError::LedgerNotFound(self.op_id.clone()))?;
        *self.cached.lock() = operation.clone();
        Ok(operation)
    }

    async fn mutate(&self, updater: impl FnOnce(&mut Operation)) -> LedgerResult<Operation> {
        let (operation, ()) = self.modify_with(|op| updater(op)).await?;
        Ok(operation)
    }

    /// Like [`Self::mutate`], but `updater` may additionally compute and
    /// return a value derived from the operation's pre-mutation shape (the
    /// heartbeat engine uses this to compute staleness off the frames as
    /// read, within the same lock hold that updates them).
    ///
    /// Built on [`PersistentStateStore::retrieve_and_lock`]/`write_and_unlock`
    /// rather than `modify`, since `modify`'s updater closure has no return
    /// channel back to the caller.
    pub(crate) async fn modify_with<R>(
        &self,
        updater: impl FnOnce(&mut Operation) -> R,
    ) -> LedgerResult<(Operation, R)> {
        let label = oplg_core::format_elapsed(self.clock.now().duration_since(self.start_instant));
        let (mut operation, guard) = self
            .store
            .retrieve_and_lock(&self.op_id, &self.participant_id, self.pid)
            .await
            .map_err(|e| map_store_err(&self.op_id, e))?;
        let computed = updater(&mut operation);
        operation.last_heartbeat = self.clock.now_iso8601();
        self.store
            .write_and_unlock(&self.op_id, &label, &operation, guard)
            .map_err(|e| map_store_err(&self.op_id, e))?;
        *self.cached.lock() = operation.clone();
        Ok((operation, computed))
    }

    /// Start a call: generates a fresh `CallId`, adds a `CallFrame`, and
    /// returns a handle whose `end`/`fail` are idempotent.
    pub async fn start_call(
        &self,
        description: Option<String>,
        fail_on_crash: bool,
    ) -> LedgerResult<ActiveCall> {
        let counter = self.call_counter.fetch_add(1, Ordering::SeqCst);
        let call_id = CallId::generate(&self.participant_id, counter);
        let now_iso = self.clock.now_iso8601();
        let frame = CallFrame {
            participant_id: self.participant_id.clone(),
            call_id: call_id.clone(),
            pid: self.pid,
            start_time: now_iso.clone(),
            last_heartbeat: now_iso,
            description,
            fail_on_crash,
        };
        self.mutate(|op| op.add_frame(frame.clone())).await?;
        self.log(LogLevel::Info, &format!("CALL_STARTED {call_id}"))?;
        Ok(ActiveCall { call_id, fail_on_crash, completed: AtomicBool::new(false) })
    }

    /// End a call by handle. Idempotent per-handle; a second `end`/`fail`
    /// on the same handle is `AlreadyCompleted` without touching the store.
    pub async fn end_call(&self, call: &ActiveCall) -> LedgerResult<()> {
        call.mark_completed()?;
        self.end_call_by_id(&call.call_id).await
    }

    /// End a call by id. `UnknownCall` if no frame with that id exists —
    /// the path the remote gateway (which only has a string id, never a
    /// handle) takes.
    pub async fn end_call_by_id(&self, call_id: &CallId) -> LedgerResult<()> {
        {
            let cached = self.cached.lock();
            if cached.find_frame(call_id).is_none() {
                return Err(LedgerError::UnknownCall(call_id.clone()));
            }
        }
        let call_id_owned = call_id.clone();
        self.mutate(|op| {
            op.remove_frame(&call_id_owned);
        })
        .await?;
        self.log(LogLevel::Info, &format!("CALL_ENDED {call_id}"))?;
        Ok(())
    }

    /// Fail a call by handle: removes the frame and, if the frame's
    /// `failOnCrash` is set, signals operation failure.
    pub async fn fail_call(&self, call: &ActiveCall, error: impl Into<String>) -> LedgerResult<()> {
        call.mark_completed()?;
        self.fail_call_by_id(&call.call_id, error).await
    }

    pub async fn fail_call_by_id(&self, call_id: &CallId, error: impl Into<String>) -> LedgerResult<()> {
        let error = error.into();
        let frame = {
            let cached = self.cached.lock();
            cached.find_frame(call_id).cloned()
        };
        let Some(frame) = frame else {
            return Err(LedgerError::UnknownCall(call_id.clone()));
        };

        let call_id_owned = call_id.clone();
        self.mutate(|op| {
            op.remove_frame(&call_id_owned);
        })
        .await?;
        self.log(LogLevel::Error, &format!("CALL_FAILED {call_id}: {error}"))?;

        if frame.fail_on_crash {
            self.signal_failure(OperationFailure {
                reason: error,
                crashed_call_ids: vec![call_id.clone()],
                failed_at: self.clock.now_iso8601(),
            });
        }
        Ok(())
    }

    pub async fn register_temp_resource(&self, path: impl Into<String>) -> LedgerResult<()> {
        let path = path.into();
        let now = self.clock.now_iso8601();
        let pid = self.pid;
        self.mutate(|op| {
            op.register_temp_resource(TempResource { path: path.clone(), owner: pid, registered_at: now.clone() });
        })
        .await?;
        Ok(())
    }

    pub async fn unregister_temp_resource(&self, path: &str) -> LedgerResult<bool> {
        let path_owned = path.to_string();
        let mut removed = false;
        self.mutate(|op| {
            removed = op.unregister_temp_resource(&path_owned).is_some();
        })
        .await?;
        Ok(removed)
    }

    /// Persist `aborted` (read by every other participant's next
    /// `checkAbort`/heartbeat tick).
    pub async fn set_abort_flag(&self, value: bool) -> LedgerResult<()> {
        self.mutate(|op| op.aborted = value).await?;
        Ok(())
    }

    /// Last-read persisted abort flag. Cheap: reads the cache, no IO.
    pub fn check_abort(&self) -> bool {
        self.cached.lock().aborted
    }

    /// Complete the local-only abort future immediately, without touching
    /// persisted state — this is a local-only signal. Used when this
    /// process itself decides to abort, ahead of the next heartbeat tick
    /// that would otherwise discover `aborted=true` from disk.
    pub fn trigger_abort(&self) {
        self.aborted_locally.store(true, Ordering::SeqCst);
        self.abort_notify.notify_waiters();
    }

    /// Resolves once this operation is aborted, either locally via
    /// [`Self::trigger_abort`] or because a heartbeat tick observed
    /// `aborted=true` in the persisted state.
    pub async fn wait_for_abort(&self) {
        loop {
            if self.aborted_locally.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.abort_notify.notified();
            tokio::pin!(notified);
            if self.aborted_locally.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Invoked by the heartbeat engine when it reads `aborted=true` from
    /// disk, so `wait_for_abort` callers wake without waiting for a local
    /// `trigger_abort`.
    pub(crate) fn note_persisted_abort(&self) {
        self.trigger_abort();
    }

    fn signal_failure(&self, failure: OperationFailure) {
        self.failure_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(failure);
            true
        });
    }

    /// Invoked by the heartbeat engine when it detects a stale participant:
    /// surfaces as the same `OperationFailure` signal a crashed call
    /// would. No success callback fires on the same tick this failure is
    /// signaled.
    pub(crate) fn signal_heartbeat_failure(&self, failure: OperationFailure) {
        self.signal_failure(failure);
    }

    /// The failure signal, if one has fired yet.
    pub fn failure(&self) -> Option<OperationFailure> {
        self.failure_tx.borrow().clone()
    }

    /// Resolves once this operation fails, from a crashed call or a
    /// stale-heartbeat detection. Used by `waitForCompletion`/`sync`.
    pub async fn wait_for_failure(&self) -> OperationFailure {
        let mut rx = self.failure_tx.subscribe();
        loop {
            if let Some(failure) = rx.borrow().clone() {
                return failure;
            }
            if rx.changed().await.is_err() {
                return OperationFailure {
                    reason: "operation core was dropped before failing".to_string(),
                    crashed_call_ids: Vec::new(),
                    failed_at: self.clock.now_iso8601(),
                };
            }
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LedgerResult<()> {
        let path = paths::log_path(self.store.base_dir(), &self.op_id);
        log::append_main(&path, &self.clock.now_iso8601(), level, message)
    }

    pub fn debug_log(&self, message: &str) -> LedgerResult<()> {
        let path = paths::debug_log_path(self.store.base_dir(), &self.op_id);
        log::append_debug(&path, &self.clock.now_iso8601(), message)
    }

    /// Complete the operation. Initiator-only. Sets
    /// `operationState=completed`, clears call frames, archives the three
    /// per-operation files under `backup/<opId>/`, and runs retention.
    ///
    /// Does not stop the heartbeat engine or unregister the operation from
    /// the registry's map — that orchestration is [`crate::registry::LedgerRegistry::complete`]'s
    /// job, one layer up, since the core has no notion of sessions or a
    /// background watchdog task.
    pub async fn complete(&self) -> LedgerResult<()> {
        if !self.is_initiator() {
            return Err(LedgerError::NotInitiator(self.op_id.clone()));
        }
        self.mutate(|op| {
            op.operation_state = oplg_core::OperationState::Completed;
            op.call_frames.clear();
        })
        .await?;
        self.log(LogLevel::Info, "OPERATION_COMPLETED")?;
        oplg_storage::archive(self.store.base_dir(), &self.op_id)?;
        oplg_storage::clean_old_backups(self.store.base_dir(), self.max_backups)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "core_tests.rs"]
mod tests;
