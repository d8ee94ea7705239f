// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oplgd`: binds the Remote Gateway (C8) to a TCP address over a
//! filesystem-backed [`LedgerRegistry`], wiring up `tracing-subscriber`
//! for structured log output before the listener comes up.

use std::net::SocketAddr;
use std::path::PathBuf;

use oplg_core::SystemClock;
use oplg_ledger::LedgerConfig;
use oplg_ledger::LedgerRegistry;
use oplg_server::{router, AppState};
use tracing_subscriber::EnvFilter;

fn base_dir() -> PathBuf {
    std::env::var_os("OPLG_BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("oplg"))
}

fn bind_addr() -> SocketAddr {
    std::env::var("OPLG_LISTEN_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 4870)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let base_dir = base_dir();
    let addr = bind_addr();
    let clock = SystemClock;
    let registry = LedgerRegistry::new(&base_dir, LedgerConfig::default(), clock.clone())?;
    registry.start_watchdog();

    let state = AppState::new(registry.clone(), clock, addr);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, base_dir = %base_dir.display(), "oplgd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown();
    Ok(())
}

#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("oplgd shutting down");
}
