// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! oplg-core: shared ids, clock abstraction, and data model for the
//! operation ledger.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod error;
pub mod id;
pub mod model;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{format_elapsed, format_iso8601, parse_iso8601_ms, Clock, FakeClock, SystemClock};
pub use error::{LedgerError, LedgerResult, OperationFailure};
pub use id::{random_hex, validate_operation_id, CallId, InvalidOperationId, OperationId, ParticipantId};
pub use model::{
    CallFrame, Operation, OperationState, TempResource, DEFAULT_STALENESS_THRESHOLD_MS,
};
