// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps the shared [`LedgerError`] vocabulary onto HTTP status codes (spec
//! §4.8, §7: "The HTTP gateway maps known errors to 4xx, unknown to 500
//! with `{error:<string>}`").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oplg_core::LedgerError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Thin wrapper so handlers can `?` straight from a [`LedgerError`] and a
/// malformed-request path can still produce the same `{error}` shape.
pub struct GatewayError(StatusCode, String);

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, message.into())
    }
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::LedgerNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InvalidOperationId(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotInitiator(_)
            | LedgerError::UnknownCall(_)
            | LedgerError::UnknownSession(_)
            | LedgerError::AlreadyCompleted(_)
            | LedgerError::PendingCalls(_)
            | LedgerError::AbortFlagSet(_)
            | LedgerError::HeartbeatStale(_, _) => StatusCode::BAD_REQUEST,
            LedgerError::LockFailed(_) | LedgerError::Io(_) | LedgerError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            LedgerError::OperationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}
