// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Heartbeat Engine (C5): a `Stopped`/`Scheduled`/`Running`/`Aborted`
//! state machine that, on a jittered interval, performs the heartbeat
//! mutation and detects both a persisted abort flag and a stale other
//! participant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use oplg_core::{parse_iso8601_ms, Clock, LedgerError, LedgerResult, OperationFailure, OperationState};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::OperationCore;
use crate::log::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Stopped,
    Scheduled,
    Running,
    Aborted,
}

/// Detail reported on a successful heartbeat tick.
#[derive(Debug, Clone)]
pub struct HeartbeatResult {
    pub abort_flag: bool,
    pub call_frame_count: usize,
    pub temp_resource_count: usize,
    pub age_ms: u64,
    pub stale: bool,
    pub participant_ages_ms: HashMap<String, u64>,
    pub stale_participants: Vec<String>,
}

/// Outcome of one heartbeat tick, as returned by [`HeartbeatEngine::tick`].
pub enum TickOutcome {
    /// The state file is gone entirely.
    LedgerMissing,
    /// The persisted `aborted` flag was observed set.
    Aborted,
    /// A participant other than self went stale; `self`'s own active
    /// frames are presumed crashed.
    StaleOther { stale_participants: Vec<String> },
    Success(HeartbeatResult),
}

struct ComputedTick {
    abort_flag: bool,
    has_stale_other: bool,
    stale_participants_excluding_self: Vec<String>,
    self_call_ids: Vec<oplg_core::CallId>,
    call_frame_count: usize,
    temp_resource_count: usize,
    participant_ages_ms: HashMap<String, u64>,
}

/// Drives one operation's heartbeat. Construct with [`HeartbeatEngine::new`]
/// and wrap in an `Arc` before calling [`HeartbeatEngine::start`], since the
/// background tick loop holds a clone of that `Arc`.
pub struct HeartbeatEngine<C: Clock> {
    core: Arc<OperationCore<C>>,
    clock: C,
    staleness_threshold_ms: u64,
    state: Mutex<HeartbeatState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> HeartbeatEngine<C> {
    pub fn new(core: Arc<OperationCore<C>>, clock: C, staleness_threshold_ms: u64) -> Self {
        Self {
            core,
            clock,
            staleness_threshold_ms,
            state: Mutex::new(HeartbeatState::Stopped),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> HeartbeatState {
        *self.state.lock()
    }

    /// From `Stopped`/`Scheduled` to `Scheduled`, starting the background
    /// tick loop if it is not already running.
    pub fn start(self: &Arc<Self>, interval: Duration, jitter_ms: u64) {
        let mut state = self.state.lock();
        if matches!(*state, HeartbeatState::Running | HeartbeatState::Aborted) {
            return;
        }
        *state = HeartbeatState::Scheduled;
        drop(state);

        if self.task.lock().is_some() {
            return;
        }
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.run_loop(interval, jitter_ms).await;
        });
        *self.task.lock() = Some(handle);
    }

    /// Cancel the pending tick and move to `Stopped`.
    pub fn stop(&self) {
        *self.state.lock() = HeartbeatState::Stopped;
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    async fn run_loop(self: Arc<Self>, interval: Duration, jitter_ms: u64) {
        loop {
            if matches!(self.state(), HeartbeatState::Stopped | HeartbeatState::Aborted) {
                return;
            }

            let jitter = if jitter_ms == 0 { 0 } else { self.clock.epoch_ms() % jitter_ms };
            tokio::time::sleep(interval + Duration::from_millis(jitter)).await;

            {
                let mut state = self.state.lock();
                if matches!(*state, HeartbeatState::Stopped) {
                    return;
                }
                *state = HeartbeatState::Running;
            }

            let outcome = self.tick().await;

            let mut state = self.state.lock();
            if matches!(*state, HeartbeatState::Stopped) {
                return;
            }
            match outcome {
                Ok(TickOutcome::Aborted) | Ok(TickOutcome::LedgerMissing) => {
                    *state = HeartbeatState::Aborted;
                    return;
                }
                _ => {
                    *state = HeartbeatState::Scheduled;
                }
            }
        }
    }

    /// Run one heartbeat mutation. Exposed directly (not only via the
    /// background loop) so tests can drive a tick without waiting on real
    /// sleeps.
    pub async fn tick(&self) -> LedgerResult<TickOutcome> {
        let before = self.core.snapshot();
        let before_hb_ms = parse_iso8601_ms(&before.last_heartbeat).unwrap_or_else(|| self.clock.epoch_ms());

        let now_iso = self.core.now_iso8601();
        let now_ms = self.core.epoch_ms();
        let self_participant = self.core.participant_id().clone();
        let threshold_ms = self.staleness_threshold_ms;

        let modify_result = self
            .core
            .modify_with(move |op| {
                let mut ages: HashMap<String, u64> = HashMap::new();
                let mut stale: Vec<String> = Vec::new();
                for frame in &op.call_frames {
                    let hb_ms = parse_iso8601_ms(&frame.last_heartbeat).unwrap_or(0);
                    let age = now_ms.saturating_sub(hb_ms);
                    ages.insert(frame.participant_id.to_string(), age);
                    if age > threshold_ms && !stale.contains(&frame.participant_id.to_string()) {
                        stale.push(frame.participant_id.to_string());
                    }
                }
                let has_stale_other = stale.iter().any(|p| p.as_str() != self_participant.as_str());
                let self_call_ids: Vec<oplg_core::CallId> =
                    op.frames_of(&self_participant).map(|f| f.call_id.clone()).collect();
                let call_frame_count = op.call_frames.len();
                let temp_resource_count = op.temp_resources.len();
                let abort_flag = op.aborted;

                for frame in op.call_frames.iter_mut() {
                    if frame.participant_id == self_participant {
                        frame.last_heartbeat = now_iso.clone();
                    }
                }

                ComputedTick {
                    abort_flag,
                    has_stale_other,
                    stale_participants_excluding_self: stale
                        .into_iter()
                        .filter(|p| p.as_str() != self_participant.as_str())
                        .collect(),
                    self_call_ids,
                    call_frame_count,
                    temp_resource_count,
                    participant_ages_ms: ages,
                }
            })
            .await;

        let (_, computed) = match modify_result {
            Ok(v) => v,
            Err(LedgerError::LedgerNotFound(_)) => return Ok(TickOutcome::LedgerMissing),
            Err(e) => return Err(e),
        };

        if computed.abort_flag {
            self.core.note_persisted_abort();
            return Ok(TickOutcome::Aborted);
        }

        let refreshed = self.core.refresh().await?;
        if matches!(refreshed.operation_state, OperationState::Cleanup | OperationState::Failed) {
            self.core.signal_heartbeat_failure(OperationFailure {
                reason: format!("operation state is {}", refreshed.operation_state),
                crashed_call_ids: Vec::new(),
                failed_at: now_iso.clone(),
            });
        }

        if computed.has_stale_other {
            for call_id in &computed.self_call_ids {
                let _ = self.core.log(LogLevel::Error, &format!("CRASH_DETECTED {call_id}"));
            }
            self.core.signal_heartbeat_failure(OperationFailure {
                reason: format!("stale participant(s): {:?}", computed.stale_participants_excluding_self),
                crashed_call_ids: computed.self_call_ids.clone(),
                failed_at: now_iso,
            });
            return Ok(TickOutcome::StaleOther { stale_participants: computed.stale_participants_excluding_self });
        }

        Ok(TickOutcome::Success(HeartbeatResult {
            abort_flag: computed.abort_flag,
            call_frame_count: computed.call_frame_count,
            temp_resource_count: computed.temp_resource_count,
            age_ms: now_ms.saturating_sub(before_hb_ms),
            stale: false,
            participant_ages_ms: computed.participant_ages_ms,
            stale_participants: computed.stale_participants_excluding_self,
        }))
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
