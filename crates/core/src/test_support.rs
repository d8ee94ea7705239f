// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders for other crates' tests, gated behind `test-support`.

use crate::clock::format_iso8601;
use crate::id::{CallId, OperationId, ParticipantId};
use crate::model::{CallFrame, Operation, OperationState, TempResource};

/// Builder for a `CallFrame` with sane test defaults.
pub struct CallFrameBuilder {
    participant_id: ParticipantId,
    call_id: CallId,
    pid: u32,
    start_time: String,
    last_heartbeat: String,
    description: Option<String>,
    fail_on_crash: bool,
}

impl CallFrameBuilder {
    pub fn new(participant: impl Into<ParticipantId>, call_id: impl Into<CallId>) -> Self {
        let now = format_iso8601(1_700_000_000_000);
        Self {
            participant_id: participant.into(),
            call_id: call_id.into(),
            pid: 1,
            start_time: now.clone(),
            last_heartbeat: now,
            description: None,
            fail_on_crash: true,
        }
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn last_heartbeat(mut self, iso: impl Into<String>) -> Self {
        self.last_heartbeat = iso.into();
        self
    }

    pub fn fail_on_crash(mut self, value: bool) -> Self {
        self.fail_on_crash = value;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> CallFrame {
        CallFrame {
            participant_id: self.participant_id,
            call_id: self.call_id,
            pid: self.pid,
            start_time: self.start_time,
            last_heartbeat: self.last_heartbeat,
            description: self.description,
            fail_on_crash: self.fail_on_crash,
        }
    }
}

/// Builder for an `Operation` with sane test defaults.
pub struct OperationBuilder {
    operation_id: OperationId,
    initiator_id: ParticipantId,
    operation_state: OperationState,
    aborted: bool,
    last_heartbeat: String,
    call_frames: Vec<CallFrame>,
    temp_resources: Vec<TempResource>,
}

impl OperationBuilder {
    pub fn new(operation_id: impl Into<OperationId>, initiator: impl Into<ParticipantId>) -> Self {
        let now = format_iso8601(1_700_000_000_000);
        Self {
            operation_id: operation_id.into(),
            initiator_id: initiator.into(),
            operation_state: OperationState::Running,
            aborted: false,
            last_heartbeat: now,
            call_frames: Vec::new(),
            temp_resources: Vec::new(),
        }
    }

    pub fn state(mut self, state: OperationState) -> Self {
        self.operation_state = state;
        self
    }

    pub fn aborted(mut self, aborted: bool) -> Self {
        self.aborted = aborted;
        self
    }

    pub fn with_frame(mut self, frame: CallFrame) -> Self {
        self.call_frames.push(frame);
        self
    }

    pub fn build(self) -> Operation {
        Operation {
            operation_id: self.operation_id,
            initiator_id: self.initiator_id,
            operation_state: self.operation_state,
            aborted: self.aborted,
            last_heartbeat: self.last_heartbeat,
            call_frames: self.call_frames,
            temp_resources: self.temp_resources,
        }
    }
}

impl From<&str> for OperationId {
    #[allow(clippy::expect_used)]
    fn from(s: &str) -> Self {
        OperationId::parse(s).expect("test operation id must be valid")
    }
}
