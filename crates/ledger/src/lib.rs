// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! oplg-ledger: the Operation Core (C3), Spawned-Call Scheduler (C4),
//! Heartbeat Engine (C5), Session/Join Registry (C6), and Ledger Registry
//! (C7) — the stateful orchestration layer built on top of `oplg-storage`'s
//! lock manager and persistent state store.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod core;
pub mod heartbeat;
pub mod log;
pub mod registry;
pub mod session;
pub mod spawn;

pub use config::LedgerConfig;
pub use core::{ActiveCall, OperationCore};
pub use heartbeat::{HeartbeatEngine, HeartbeatResult, HeartbeatState, TickOutcome};
pub use log::LogLevel;
pub use registry::{LedgerRegistry, ManagedOperation};
pub use session::{SessionRegistry, DIRECT_SESSION};
pub use spawn::{CancelHandle, CompletionOutcome, SpawnedCall, SyncResult};
