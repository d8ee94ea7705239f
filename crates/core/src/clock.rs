// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Every staleness check, backoff delay, and heartbeat jitter computation
//! goes through a [`Clock`] rather than calling `Instant::now()`/`SystemTime::now()`
//! directly, so the heartbeat/crash-detection state machine can be driven
//! deterministically in tests instead of sleeping on a wall clock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time, both as a monotonic `Instant`
/// (for intervals/backoff) and as wall-clock epoch milliseconds (for
/// `lastHeartbeat` timestamps and staleness, which is computed from
/// wall-clock delta, not monotonic time, so it survives across process
/// restarts).
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;

    /// Current time formatted as an ISO-8601 string, for log lines and
    /// the `lastHeartbeat` field.
    fn now_iso8601(&self) -> String {
        format_iso8601(self.epoch_ms())
    }
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { current: Arc::new(Mutex::new(Instant::now())), epoch_ms: Arc::new(Mutex::new(1_700_000_000_000)) }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }

    /// Set the epoch milliseconds value directly.
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

/// Format epoch milliseconds as an ISO-8601 string (`2026-07-28T09:15:30.123Z`),
/// used for log lines and the `lastHeartbeat` field.
#[allow(clippy::expect_used)]
pub fn format_iso8601(epoch_ms: u64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(epoch_ms as i64).unwrap_or_else(|| DateTime::from_timestamp_millis(0).expect("epoch 0 is valid"));
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Format epoch milliseconds as the compact timestamp prefix used inside
/// generated operation ids: `YYYYMMDDTHH-MM-SS.sss`. Colons are
/// canonicalized to `-` for filesystem portability.
#[allow(clippy::expect_used)]
pub fn format_timestamp_compact(epoch_ms: u64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(epoch_ms as i64).unwrap_or_else(|| DateTime::from_timestamp_millis(0).expect("epoch 0 is valid"));
    dt.format("%Y%m%dT%H-%M-%S%.3f").to_string()
}

/// Elapsed time since process start, formatted as the `SSS.mmm` trail
/// snapshot label used in `<elapsedLabel>_<opId>.json` filenames.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:03}.{:03}", elapsed.as_secs(), elapsed.subsec_millis())
}

/// Parse a `lastHeartbeat`/`timestamp` string (RFC 3339, the shape
/// [`format_iso8601`] produces) back into epoch milliseconds.
///
/// Returns `None` on any unparseable input rather than erroring, since every
/// caller (staleness checks, lock-orphan detection) treats an unparseable
/// timestamp as maximally stale rather than a hard failure.
pub fn parse_iso8601_ms(s: &str) -> Option<u64> {
    let dt = DateTime::parse_from_rfc3339(s).ok()?;
    u64::try_from(dt.timestamp_millis()).ok()
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
