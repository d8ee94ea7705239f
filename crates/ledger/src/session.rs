// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Session/Join Registry (C6): multiplexes logical handles
//! over one physical operation inside a process, refcounting the heartbeat
//! engine's lifetime by live session count.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oplg_core::{CallId, Clock, LedgerError, LedgerResult};
use parking_lot::Mutex;

use crate::core::{ActiveCall, OperationCore};
use crate::heartbeat::HeartbeatEngine;
use crate::spawn::{CancelHandle, SpawnedCall};

/// Session id reserved for calls started outside any session. Direct
/// (non-session) call creation uses this reserved id so those calls do
/// not appear in any session's view.
pub const DIRECT_SESSION: u64 = 0;

/// Type-erased view of a spawned call, so one session can hold
/// `SpawnedCall<T>` handles of differing `T` in the same pending list.
trait PendingSpawned: Send + Sync {
    fn call_id(&self) -> &CallId;
    fn is_completed(&self) -> bool;
    fn cancel(&self);
}

impl<T: Send + 'static> PendingSpawned for SpawnedCall<T> {
    fn call_id(&self) -> &CallId {
        SpawnedCall::call_id(self)
    }

    fn is_completed(&self) -> bool {
        SpawnedCall::is_completed(self)
    }

    fn cancel(&self) {
        SpawnedCall::cancel(self)
    }
}

#[derive(Default)]
struct SessionEntry {
    calls: Vec<Arc<ActiveCall>>,
    spawned: Vec<Arc<dyn PendingSpawned>>,
}

/// Per-operation session bookkeeping (C6). One instance is owned per
/// [`crate::registry::ManagedOperation`]; every `createOperation`/
/// `joinOperation` call routes through [`Self::new_session`].
pub struct SessionRegistry<C: Clock> {
    core: Arc<OperationCore<C>>,
    heartbeat: Arc<HeartbeatEngine<C>>,
    heartbeat_interval: Duration,
    heartbeat_jitter_ms: u64,
    next_session: AtomicU64,
    sessions: Mutex<HashMap<u64, SessionEntry>>,
}

impl<C: Clock> SessionRegistry<C> {
    pub fn new(
        core: Arc<OperationCore<C>>,
        heartbeat: Arc<HeartbeatEngine<C>>,
        heartbeat_interval: Duration,
        heartbeat_jitter_ms: u64,
    ) -> Self {
        Self {
            core,
            heartbeat,
            heartbeat_interval,
            heartbeat_jitter_ms,
            next_session: AtomicU64::new(DIRECT_SESSION + 1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live sessions (`joinCount`).
    pub fn join_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Allocate a fresh session id. Starts the heartbeat engine if this is
    /// the first live session in the process — the engine only runs while
    /// `joinCount > 0`.
    pub fn new_session(&self) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock();
        let was_empty = sessions.is_empty();
        sessions.insert(id, SessionEntry::default());
        drop(sessions);
        if was_empty {
            self.heartbeat.start(self.heartbeat_interval, self.heartbeat_jitter_ms);
        }
        id
    }

    fn require_session(&self, session: u64) -> LedgerResult<()> {
        if session == DIRECT_SESSION || self.sessions.lock().contains_key(&session) {
            Ok(())
        } else {
            Err(LedgerError::UnknownSession(session))
        }
    }

    /// Start a call attributed to `session` (or [`DIRECT_SESSION`] for a
    /// call started outside any session view).
    pub async fn start_call(
        &self,
        session: u64,
        description: Option<String>,
        fail_on_crash: bool,
    ) -> LedgerResult<Arc<ActiveCall>> {
        self.require_session(session)?;
        let call = Arc::new(self.core.start_call(description, fail_on_crash).await?);
        if session != DIRECT_SESSION {
            if let Some(entry) = self.sessions.lock().get_mut(&session) {
                entry.calls.push(Arc::clone(&call));
            }
        }
        Ok(call)
    }

    /// Spawn a call attributed to `session`, same session-view bookkeeping
    /// as [`Self::start_call`].
    pub async fn spawn_call<T, F, Fut>(
        &self,
        session: u64,
        description: Option<String>,
        fail_on_crash: bool,
        work: F,
    ) -> LedgerResult<Arc<SpawnedCall<T>>>
    where
        T: Send + 'static,
        F: FnOnce(CancelHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        self.require_session(session)?;
        let call = Arc::new(self.core.spawn_call(description, fail_on_crash, work).await?);
        if session != DIRECT_SESSION {
            if let Some(entry) = self.sessions.lock().get_mut(&session) {
                entry.spawned.push(Arc::clone(&call) as Arc<dyn PendingSpawned>);
            }
        }
        Ok(call)
    }

    pub fn has_pending_calls(&self, session: u64) -> bool {
        self.pending_call_count(session) > 0
    }

    pub fn pending_call_count(&self, session: u64) -> usize {
        let sessions = self.sessions.lock();
        sessions.get(&session).map_or(0, |entry| {
            entry.calls.iter().filter(|c| !c.is_completed()).count()
                + entry.spawned.iter().filter(|c| !c.is_completed()).count()
        })
    }

    pub fn pending_calls(&self, session: u64) -> Vec<CallId> {
        let sessions = self.sessions.lock();
        sessions.get(&session).map_or_else(Vec::new, |entry| {
            entry.calls.iter().filter(|c| !c.is_completed()).map(|c| c.call_id().clone()).collect()
        })
    }

    pub fn pending_spawned_calls(&self, session: u64) -> Vec<CallId> {
        let sessions = self.sessions.lock();
        sessions.get(&session).map_or_else(Vec::new, |entry| {
            entry.spawned.iter().filter(|c| !c.is_completed()).map(|c| c.call_id().clone()).collect()
        })
    }

    /// Leave a session. Returns `true` if this was the last
    /// live session in the process, so the caller
    /// ([`crate::registry::LedgerRegistry`]) should drop the
    /// [`crate::registry::ManagedOperation`] entirely.
    pub fn leave(&self, session: u64, cancel_pending_calls: bool) -> LedgerResult<bool> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get(&session).ok_or(LedgerError::UnknownSession(session))?;

        let pending_spawned: Vec<_> = entry.spawned.iter().filter(|c| !c.is_completed()).cloned().collect();
        if !pending_spawned.is_empty() && !cancel_pending_calls {
            return Err(LedgerError::PendingCalls(session));
        }
        for call in &pending_spawned {
            call.cancel();
        }

        sessions.remove(&session);
        let now_empty = sessions.is_empty();
        drop(sessions);

        if now_empty {
            self.heartbeat.stop();
        }
        Ok(now_empty)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
