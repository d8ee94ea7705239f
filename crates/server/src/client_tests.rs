// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::http::{router, AppState};
use oplg_core::FakeClock;
use oplg_ledger::LedgerConfig;
use oplg_ledger::LedgerRegistry;
use std::net::{SocketAddr, TcpListener as StdTcpListener};

async fn spawn_server() -> (RemoteClient, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let registry = LedgerRegistry::new(dir.path(), LedgerConfig::default(), clock.clone()).unwrap();
    let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let addr: SocketAddr = std_listener.local_addr().unwrap();
    let state = AppState::new(registry, clock, addr);
    let app = router(state);

    let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (RemoteClient::new(format!("http://{addr}")), dir)
}

#[tokio::test]
async fn health_reports_ok() {
    let (client, _dir) = spawn_server().await;
    assert!(client.health().await.unwrap());
}

#[tokio::test]
async fn create_join_call_and_complete_round_trip() {
    let (client, _dir) = spawn_server().await;

    let created = client.create_operation("cli", Some("demo"), None).await.unwrap();
    assert!(created.is_initiator);

    let joined = client.join_operation(&created.operation_id, "bridge", None).await.unwrap();
    assert!(!joined.is_initiator);

    let call = client.start_call(&created.operation_id, Some("step"), Some(true)).await.unwrap();
    assert!(!call.call_id.is_empty());

    let state = client.state(&created.operation_id).await.unwrap();
    assert_eq!(state.call_frame_count, 1);

    let ended = client.end_call(&created.operation_id, &call.call_id).await.unwrap();
    assert!(ended.success);

    let completed = client.complete_operation(&created.operation_id).await.unwrap();
    assert!(completed.success);
}

#[tokio::test]
async fn join_unknown_operation_surfaces_gateway_error() {
    let (client, _dir) = spawn_server().await;
    let err = client.join_operation("20260101T00-00-00.000-x-deadbeef", "bridge", None).await.unwrap_err();
    match err {
        RemoteError::Gateway { status, .. } => assert_eq!(status, 404),
        RemoteError::Transport(..) => panic!("expected a gateway error, not a transport failure"),
    }
}

#[tokio::test]
async fn abort_and_heartbeat_round_trip() {
    let (client, _dir) = spawn_server().await;
    let created = client.create_operation("cli", None, None).await.unwrap();

    let abort_resp = client.set_abort_flag(&created.operation_id, true).await.unwrap();
    assert!(abort_resp.success);

    let hb = client.heartbeat(&created.operation_id).await.unwrap();
    assert!(hb.success);
    assert_eq!(hb.abort_flag, Some(true));
}
