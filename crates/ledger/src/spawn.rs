// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Spawned-Call Scheduler (C4): `SpawnedCall<T>` tracks a
//! unit of user-supplied async work as a `CallFrame`, racing it against the
//! operation's failure signal, with cooperative `cancel()` and forceful
//! `kill()`.
//!
//! The `onCompletion`/`onCleanup`/`onOperationFailed` callback parameters
//! from the source design collapse here into ordinary return values and
//! the `sync`/`wait_for_completion` race: a Rust `work` closure that wants
//! to rescue a thrown error into a fallback success just catches it before
//! returning `Ok`, and a caller that wants to react to operation failure
//! awaits `wait_for_completion`'s `OperationFailed` arm directly rather
//! than receiving a callback invocation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use oplg_core::{CallId, Clock, LedgerResult, OperationFailure};
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::sync::Notify;

use crate::core::OperationCore;
use crate::log::LogLevel;

/// Cooperative cancellation flag handed to a spawned call's work closure.
/// `cancel()` only sets the flag; the work closure is expected to poll
/// [`CancelHandle::is_canceled`] at its own suspension points.
#[derive(Clone)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

enum Outcome<T> {
    Succeeded(T),
    Failed(String),
}

struct Shared<T> {
    completed: AtomicBool,
    succeeded: AtomicBool,
    outcome: Mutex<Option<Outcome<T>>>,
    done: Notify,
}

/// Handle to a unit of work spawned via [`OperationCore::spawn_call`].
pub struct SpawnedCall<T> {
    call_id: CallId,
    canceled: Arc<AtomicBool>,
    subprocess: Arc<Mutex<Option<Child>>>,
    cancel_callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> SpawnedCall<T> {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Whether the call ran to completion successfully. Remains accurate
    /// after [`Self::wait`] has consumed the result.
    pub fn succeeded(&self) -> bool {
        self.shared.succeeded.load(Ordering::SeqCst)
    }

    /// Cooperative cancel: sets the flag the work closure polls via its
    /// [`CancelHandle`], then invokes the cancel callback (if one was set
    /// via [`Self::set_cancel_callback`]). Idempotent — a second call
    /// leaves the flag set and finds no callback left to invoke.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        if let Some(callback) = self.cancel_callback.lock().take() {
            callback();
        }
    }

    /// Register an optional callback invoked the first time [`Self::cancel`]
    /// is called.
    pub fn set_cancel_callback(&self, callback: impl FnOnce() + Send + 'static) {
        *self.cancel_callback.lock() = Some(Box::new(callback));
    }

    /// Forceful kill of an attached subprocess. Idempotent; returns
    /// `false` if no subprocess is attached.
    pub fn kill(&self) -> bool {
        let mut guard = self.subprocess.lock();
        match guard.as_mut() {
            Some(child) => {
                let _ = child.start_kill();
                true
            }
            None => false,
        }
    }

    /// Attach a subprocess handle for [`Self::kill`] to terminate later.
    /// A back-channel used only by `kill`, distinct from the work future.
    pub fn attach_subprocess(&self, child: Child) {
        *self.subprocess.lock() = Some(child);
    }

    /// Wait for completion and take the stored outcome. Calling this a
    /// second time returns an error, since the result was already moved
    /// out — the categorization methods ([`Self::is_completed`],
    /// [`Self::succeeded`]) remain valid regardless.
    pub async fn wait(&self) -> Result<T, String> {
        self.wait_for_completion_signal().await;
        match self.shared.outcome.lock().take() {
            Some(Outcome::Succeeded(v)) => Ok(v),
            Some(Outcome::Failed(e)) => Err(e),
            None => Err("spawned call result already consumed".to_string()),
        }
    }

    async fn wait_for_completion_signal(&self) {
        loop {
            if self.is_completed() {
                return;
            }
            let notified = self.shared.done.notified();
            tokio::pin!(notified);
            if self.is_completed() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of [`OperationCore::sync`].
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub successful: Vec<CallId>,
    pub failed: Vec<CallId>,
    pub unknown: Vec<CallId>,
    pub operation_failed: bool,
}

impl SyncResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.unknown.is_empty() && !self.operation_failed
    }
}

/// Outcome of [`OperationCore::wait_for_completion`]: either the work ran
/// to completion (with its own `Result`), or the operation failed first.
pub enum CompletionOutcome<T> {
    Completed(Result<T, String>),
    OperationFailed(OperationFailure),
}

impl<C: Clock> OperationCore<C> {
    /// Spawn a unit of user work, tracked as a `CallFrame` for the
    /// duration of its run.
    pub async fn spawn_call<T, F, Fut>(
        self: &Arc<Self>,
        description: Option<String>,
        fail_on_crash: bool,
        work: F,
    ) -> LedgerResult<SpawnedCall<T>>
    where
        T: Send + 'static,
        F: FnOnce(CancelHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        let active = self.start_call(description, fail_on_crash).await?;
        let call_id = active.call_id().clone();
        self.log(LogLevel::Info, &format!("CALL_SPAWNED {call_id}"))?;

        let canceled = Arc::new(AtomicBool::new(false));
        let subprocess = Arc::new(Mutex::new(None));
        let shared = Arc::new(Shared {
            completed: AtomicBool::new(false),
            succeeded: AtomicBool::new(false),
            outcome: Mutex::new(None),
            done: Notify::new(),
        });

        let handle = CancelHandle { canceled: Arc::clone(&canceled) };
        let core = Arc::clone(self);
        let shared_task = Arc::clone(&shared);
        let call_id_task = call_id.clone();

        tokio::spawn(async move {
            match work(handle).await {
                Ok(value) => {
                    *shared_task.outcome.lock() = Some(Outcome::Succeeded(value));
                    shared_task.succeeded.store(true, Ordering::SeqCst);
                    shared_task.completed.store(true, Ordering::SeqCst);
                    shared_task.done.notify_waiters();
                    let _ = core.end_call_by_id(&call_id_task).await;
                    let _ = core.log(LogLevel::Info, &format!("CALL_COMPLETED {call_id_task}"));
                }
                Err(error) => {
                    *shared_task.outcome.lock() = Some(Outcome::Failed(error.clone()));
                    shared_task.completed.store(true, Ordering::SeqCst);
                    shared_task.done.notify_waiters();
                    let _ = core.fail_call_by_id(&call_id_task, error).await;
                    let _ = core.log(LogLevel::Error, &format!("CALL_FAILED {call_id_task}"));
                }
            }
        });

        Ok(SpawnedCall { call_id, canceled, subprocess, cancel_callback: Mutex::new(None), shared })
    }

    /// Wait on the disjunction of (all `calls` completed) and (operation
    /// failure), then categorize each call.
    pub async fn sync<T: Send + 'static>(&self, calls: &[SpawnedCall<T>]) -> SyncResult {
        let all_completed = async {
            for call in calls {
                call.wait_for_completion_signal().await;
            }
        };

        tokio::select! {
            _ = all_completed => {},
            _ = self.wait_for_failure() => {},
        }

        let mut result = SyncResult { operation_failed: self.failure().is_some(), ..Default::default() };
        for call in calls {
            if call.is_completed() {
                if call.succeeded() {
                    result.successful.push(call.call_id().clone());
                } else {
                    result.failed.push(call.call_id().clone());
                }
            } else {
                result.unknown.push(call.call_id().clone());
            }
        }
        result
    }

    /// Run `work` racing against operation failure (`waitForCompletion`).
    /// Does not register a `CallFrame` — callers that
    /// want frame tracking use [`Self::spawn_call`] instead.
    pub async fn wait_for_completion<T, Fut>(&self, work: Fut) -> CompletionOutcome<T>
    where
        Fut: Future<Output = Result<T, String>>,
    {
        tokio::select! {
            result = work => CompletionOutcome::Completed(result),
            failure = self.wait_for_failure() => CompletionOutcome::OperationFailed(failure),
        }
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
