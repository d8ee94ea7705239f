// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Construction parameters for a [`crate::registry::LedgerRegistry`] (spec
//! §4.7), plumbed down to the lock manager and heartbeat engine it owns.

use std::time::Duration;

use oplg_core::DEFAULT_STALENESS_THRESHOLD_MS;
use oplg_storage::LockConfig;

/// Tunables shared by every operation a [`crate::registry::LedgerRegistry`]
/// instantiates.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How many backup folders `complete()`'s retention pass keeps.
    pub max_backups: usize,
    /// Heartbeat tick interval; the jittered reschedule adds up to
    /// `heartbeat_jitter` on top of this.
    pub heartbeat_interval: Duration,
    pub heartbeat_jitter: Duration,
    /// A `CallFrame`'s `lastHeartbeat` older than this is stale.
    pub staleness_threshold_ms: u64,
    /// Lock acquisition timeout, retry interval, and its cap.
    pub lock_timeout: Duration,
    pub lock_retry_interval: Duration,
    pub max_lock_retry_interval: Duration,
    /// How old an unowned lock file must be before takeover is considered.
    pub stale_lock_threshold: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_backups: 20,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_jitter: Duration::from_millis(500),
            staleness_threshold_ms: DEFAULT_STALENESS_THRESHOLD_MS,
            lock_timeout: Duration::from_secs(2),
            lock_retry_interval: Duration::from_millis(50),
            max_lock_retry_interval: Duration::from_millis(500),
            stale_lock_threshold: Duration::from_secs(15),
        }
    }
}

impl LedgerConfig {
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            lock_timeout: self.lock_timeout,
            lock_retry_interval: self.lock_retry_interval,
            max_lock_retry_interval: self.max_lock_retry_interval,
            stale_threshold: self.stale_lock_threshold,
        }
    }
}
