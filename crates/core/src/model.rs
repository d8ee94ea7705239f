// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure data-model types for the operation ledger.
//!
//! These are the types serialized into `<opId>.operation.json`. They carry
//! no behavior beyond staleness/serde helpers — the mutation protocol lives
//! in `oplg-storage` and `oplg-ledger`.

use crate::id::{CallId, OperationId, ParticipantId};
use serde::{Deserialize, Serialize};

/// Default staleness threshold for a `CallFrame`: 10 seconds.
pub const DEFAULT_STALENESS_THRESHOLD_MS: u64 = 10_000;

/// An operation's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Running,
    Cleanup,
    Failed,
    Completed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationState::Running => "running",
            OperationState::Cleanup => "cleanup",
            OperationState::Failed => "failed",
            OperationState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// One in-flight call tracked inside an operation.
///
/// `failOnCrash` defaults to `true` on deserialization, so older persisted
/// frames without the field are treated as crash-sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub participant_id: ParticipantId,
    pub call_id: CallId,
    pub pid: u32,
    pub start_time: String,
    pub last_heartbeat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_fail_on_crash")]
    pub fail_on_crash: bool,
}

fn default_fail_on_crash() -> bool {
    true
}

impl CallFrame {
    /// Age of this frame's `lastHeartbeat` in milliseconds, relative to `now_ms`.
    /// Saturates at zero if clocks disagree (e.g. clock skew across hosts).
    pub fn age_ms(&self, now_ms: u64, last_heartbeat_ms: u64) -> u64 {
        now_ms.saturating_sub(last_heartbeat_ms)
    }

    /// Whether this frame is stale under the given threshold.
    pub fn is_stale(&self, age_ms: u64, threshold_ms: u64) -> bool {
        age_ms > threshold_ms
    }
}

/// A temporary resource an operation's owner registered for external
/// cleanup. Opaque to the core beyond path equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempResource {
    pub path: String,
    pub owner: u32,
    pub registered_at: String,
}

/// The root persisted entity, serialized as the operation's state JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: OperationId,
    pub initiator_id: ParticipantId,
    pub operation_state: OperationState,
    pub aborted: bool,
    pub last_heartbeat: String,
    pub call_frames: Vec<CallFrame>,
    pub temp_resources: Vec<TempResource>,
}

impl Operation {
    /// Construct a freshly-created operation in the `running` state, owned
    /// by `initiator`, with no frames or temp resources.
    pub fn new(operation_id: OperationId, initiator: ParticipantId, now_iso: String) -> Self {
        Self {
            operation_id,
            initiator_id: initiator,
            operation_state: OperationState::Running,
            aborted: false,
            last_heartbeat: now_iso,
            call_frames: Vec::new(),
            temp_resources: Vec::new(),
        }
    }

    /// Find a frame by call id. At most one frame can match a given call
    /// id at any instant.
    pub fn find_frame(&self, call_id: &CallId) -> Option<&CallFrame> {
        self.call_frames.iter().find(|f| &f.call_id == call_id)
    }

    pub fn find_frame_mut(&mut self, call_id: &CallId) -> Option<&mut CallFrame> {
        self.call_frames.iter_mut().find(|f| &f.call_id == call_id)
    }

    /// Remove a frame by call id, returning it if present. Calling this
    /// twice for the same id is safe — the second call simply returns
    /// `None`.
    pub fn remove_frame(&mut self, call_id: &CallId) -> Option<CallFrame> {
        let idx = self.call_frames.iter().position(|f| &f.call_id == call_id)?;
        Some(self.call_frames.remove(idx))
    }

    /// Add a frame. Keeping `callId` unique is the caller's responsibility —
    /// call ids are generated fresh per call, so collisions do not occur in
    /// practice; this does not re-check.
    pub fn add_frame(&mut self, frame: CallFrame) {
        self.call_frames.push(frame);
    }

    /// Register a temp resource; replaces an existing entry with the same
    /// path.
    pub fn register_temp_resource(&mut self, resource: TempResource) {
        if let Some(existing) = self.temp_resources.iter_mut().find(|r| r.path == resource.path) {
            *existing = resource;
        } else {
            self.temp_resources.push(resource);
        }
    }

    /// Unregister a temp resource by exact path match.
    pub fn unregister_temp_resource(&mut self, path: &str) -> Option<TempResource> {
        let idx = self.temp_resources.iter().position(|r| r.path == path)?;
        Some(self.temp_resources.remove(idx))
    }

    /// Frames owned by the given participant.
    pub fn frames_of<'a>(&'a self, participant: &'a ParticipantId) -> impl Iterator<Item = &'a CallFrame> {
        self.call_frames.iter().filter(move |f| &f.participant_id == participant)
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
