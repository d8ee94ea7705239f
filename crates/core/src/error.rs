// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared error-kind vocabulary for the ledger.
//!
//! Each layer (`oplg-storage`, `oplg-ledger`, `oplg-server`) has its own
//! `thiserror` enum for the errors specific to that layer's mechanics (lock
//! IO, HTTP status mapping, ...), but every one of them composes or maps
//! into this shared set of *semantic* outcomes so callers across process
//! and network boundaries see the same vocabulary.

use crate::id::{CallId, OperationId};
use thiserror::Error;

/// Terminal operation-level signal, surfaced to `waitForCompletion`,
/// `sync`, and user callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub reason: String,
    pub crashed_call_ids: Vec<CallId>,
    pub failed_at: String,
}

/// The shared error-kind vocabulary.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("operation {0} not found")]
    LedgerNotFound(OperationId),

    #[error("failed to acquire lock for operation {0} within timeout")]
    LockFailed(OperationId),

    #[error("abort flag observed for operation {0}")]
    AbortFlagSet(OperationId),

    #[error("heartbeat observed stale participant(s) for operation {0}: {1:?}")]
    HeartbeatStale(OperationId, Vec<String>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid operation id: {0}")]
    InvalidOperationId(#[from] crate::id::InvalidOperationId),

    #[error("only the initiator may complete operation {0}")]
    NotInitiator(OperationId),

    #[error("unknown call id {0}")]
    UnknownCall(CallId),

    #[error("unknown session {0}")]
    UnknownSession(u64),

    #[error("call {0} was already completed")]
    AlreadyCompleted(CallId),

    #[error("session {0} has pending spawned calls")]
    PendingCalls(u64),

    #[error("operation {operation} failed: {failure:?}")]
    OperationFailed { operation: OperationId, failure: OperationFailure },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
