// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error vocabulary for the lock manager and persistent state store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to acquire lock within timeout")]
    LockFailed,
    #[error("operation state file is missing")]
    OperationMissing,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
