// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive per-operation file lock with exponential backoff and stale-lock
//! takeover (C1).
//!
//! Acquisition is atomic exclusive file creation (`O_CREAT|O_EXCL`, i.e.
//! [`std::fs::OpenOptions::create_new`]) rather than an OS advisory lock —
//! the lock's *content* (`{participantId, pid, timestamp}`) is itself the
//! liveness evidence consulted during takeover, so the file's existence is
//! the lock.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use oplg_core::{parse_iso8601_ms, Clock, Operation, ParticipantId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

/// Default staleness threshold used to assert a lock owner has crashed
/// (`staleThreshold`).
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    pub lock_timeout: Duration,
    pub lock_retry_interval: Duration,
    pub max_lock_retry_interval: Duration,
    pub stale_threshold: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            lock_retry_interval: Duration::from_millis(50),
            max_lock_retry_interval: Duration::from_millis(500),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockContents {
    participant_id: ParticipantId,
    pid: u32,
    timestamp: String,
}

/// Acquires and releases the per-operation lock.
pub struct LockManager<C> {
    config: LockConfig,
    clock: C,
}

impl<C: Clock> LockManager<C> {
    pub fn new(config: LockConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the lock at `lock_path`, consulting `state_path` for
    /// stale-lock takeover. Returns a guard that unlinks the lock file on
    /// drop.
    pub async fn acquire(
        &self,
        lock_path: &Path,
        state_path: &Path,
        participant_id: &ParticipantId,
        pid: u32,
    ) -> Result<LockGuard, StoreError> {
        let deadline = self.clock.now() + self.config.lock_timeout;
        let mut backoff = self.config.lock_retry_interval;

        loop {
            if self.try_create(lock_path, participant_id, pid)? {
                debug!(lock = %lock_path.display(), "lock acquired");
                return Ok(LockGuard { lock_path: lock_path.to_path_buf() });
            }

            if self.is_orphaned(lock_path, state_path) {
                debug!(lock = %lock_path.display(), "removing orphaned lock");
                let _ = std::fs::remove_file(lock_path);
                continue;
            }

            if self.clock.now() >= deadline {
                return Err(StoreError::LockFailed);
            }

            debug!(lock = %lock_path.display(), backoff_ms = backoff.as_millis(), "lock busy, backing off");
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(
                Duration::from_secs_f64(backoff.as_secs_f64() * 1.5),
                self.config.max_lock_retry_interval,
            );
        }
    }

    fn try_create(&self, lock_path: &Path, participant_id: &ParticipantId, pid: u32) -> Result<bool, StoreError> {
        let contents = LockContents {
            participant_id: participant_id.clone(),
            pid,
            timestamp: self.clock.now_iso8601(),
        };
        let json = serde_json::to_vec(&contents)?;

        use std::io::Write as _;
        match std::fs::OpenOptions::new().write(true).create_new(true).open(lock_path) {
            Ok(mut file) => {
                file.write_all(&json)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the existing lock should be considered abandoned: its mtime
    /// exceeds `lockTimeout`, and either its content is unparseable, the
    /// operation file is absent, the owner has no frames, or every owned
    /// frame is older than `staleThreshold`.
    fn is_orphaned(&self, lock_path: &Path, state_path: &Path) -> bool {
        let mtime = match std::fs::metadata(lock_path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return true,
        };
        let age = SystemTime::now().duration_since(mtime).unwrap_or_default();
        if age < self.config.lock_timeout {
            return false;
        }

        let lock: LockContents = match std::fs::read_to_string(lock_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
        {
            Some(l) => l,
            None => return true,
        };

        let operation: Operation = match std::fs::read_to_string(state_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
        {
            Some(op) => op,
            None => return true,
        };

        let owner_frames: Vec<_> = operation.frames_of(&lock.participant_id).collect();
        if owner_frames.is_empty() {
            return true;
        }

        let now_ms = self.clock.epoch_ms();
        let stale_threshold_ms = self.config.stale_threshold.as_millis() as u64;
        owner_frames.iter().all(|f| {
            let hb_ms = parse_iso8601_ms(&f.last_heartbeat).unwrap_or(0);
            now_ms.saturating_sub(hb_ms) > stale_threshold_ms
        })
    }
}

/// Holds the lock for as long as it is alive. Release is unconditional
/// unlink; a missing lock file at drop time is not an error.
pub struct LockGuard {
    lock_path: PathBuf,
}

impl LockGuard {
    /// Explicit release, for call sites that want the unlock to be visible
    /// in the control flow rather than implicit at scope end.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
