// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! oplg-server: the Remote Gateway (C8) — an axum HTTP server re-exposing
//! `oplg-ledger`'s capability surface to participants that don't share the
//! filesystem, plus a thin client implementing the same surface over
//! HTTP.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod error;
pub mod http;

pub use client::{RemoteClient, RemoteError};
pub use error::GatewayError;
pub use http::{router, AppState};
