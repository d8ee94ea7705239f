// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Remote Gateway (C8): a stateless-wire, stateful-process HTTP
//! server. Each mutating request carries a `participantId` (on
//! `create`/`join`) or relies on the identity those calls established for
//! the operation on this process. The thinness is on the client side —
//! the gateway itself still owns real [`LedgerRegistry`] sessions so the
//! heartbeat engine keeps running between requests.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use oplg_core::{Clock, LedgerError, OperationId, ParticipantId};
use oplg_ledger::{LedgerRegistry, ManagedOperation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GatewayError;

/// Shared state behind every handler: one instance shared across the
/// whole axum `Router` rather than reconstructed per connection, since
/// HTTP requests carry no persistent socket to hang a context off.
pub struct AppState<C: Clock> {
    registry: Arc<LedgerRegistry<C>>,
    clock: C,
    addr: SocketAddr,
    started_at: Instant,
    /// The gateway's own session id per `(operationId, participantId)` it
    /// established via `create`/`join`, so later single-argument endpoints
    /// (`heartbeat`, `leave`, `call/start`, ...) don't need to repeat the
    /// identity on every request.
    sessions: Mutex<HashMap<(OperationId, ParticipantId), u64>>,
    /// The identity most recently established for a given `operationId` on
    /// this gateway, so an endpoint whose body is just `{operationId}` can
    /// resolve which participant's session to act through.
    default_participant: Mutex<HashMap<OperationId, ParticipantId>>,
}

impl<C: Clock> AppState<C> {
    pub fn new(registry: Arc<LedgerRegistry<C>>, clock: C, addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            registry,
            clock,
            addr,
            started_at: Instant::now(),
            sessions: Mutex::new(HashMap::new()),
            default_participant: Mutex::new(HashMap::new()),
        })
    }

    fn remember(&self, op_id: &OperationId, participant_id: &ParticipantId, session: u64) {
        self.sessions.lock().insert((op_id.clone(), participant_id.clone()), session);
        self.default_participant.lock().insert(op_id.clone(), participant_id.clone());
    }

    fn forget(&self, op_id: &OperationId, participant_id: &ParticipantId) {
        self.sessions.lock().remove(&(op_id.clone(), participant_id.clone()));
        let mut default = self.default_participant.lock();
        if default.get(op_id) == Some(participant_id) {
            default.remove(op_id);
        }
    }

    /// Resolve `{operationId}`-only bodies to the identity and session this
    /// gateway established for it. 404s the same as an unknown operation if
    /// no `create`/`join` has happened yet on this process.
    fn resolve(&self, op_id: &OperationId) -> Result<(Arc<ManagedOperation<C>>, ParticipantId, u64), GatewayError> {
        let participant_id = self
            .default_participant
            .lock()
            .get(op_id)
            .cloned()
            .ok_or_else(|| LedgerError::LedgerNotFound(op_id.clone()))?;
        let managed = self
            .registry
            .operation(op_id, &participant_id)
            .ok_or_else(|| LedgerError::LedgerNotFound(op_id.clone()))?;
        let session = self
            .sessions
            .lock()
            .get(&(op_id.clone(), participant_id.clone()))
            .copied()
            .unwrap_or(oplg_ledger::DIRECT_SESSION);
        Ok((managed, participant_id, session))
    }

    fn parse_operation_id(s: &str) -> Result<OperationId, GatewayError> {
        OperationId::parse(s).map_err(LedgerError::from).map_err(GatewayError::from)
    }
}

pub fn router<C: Clock>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status::<C>))
        .route("/operation/create", post(create_operation::<C>))
        .route("/operation/join", post(join_operation::<C>))
        .route("/operation/leave", post(leave_operation::<C>))
        .route("/operation/complete", post(complete_operation::<C>))
        .route("/operation/heartbeat", post(heartbeat::<C>))
        .route("/operation/abort", post(abort::<C>))
        .route("/operation/state", get(state_get::<C>).post(state_post::<C>))
        .route("/operation/log", post(log_line::<C>))
        .route("/call/start", post(call_start::<C>))
        .route("/call/end", post(call_end::<C>))
        .route("/call/fail", post(call_fail::<C>))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct StatusResponse {
    service: &'static str,
    version: &'static str,
    status: &'static str,
    port: u16,
    #[serde(rename = "basePath")]
    base_path: String,
    timestamp: String,
}

async fn status<C: Clock>(State(state): State<Arc<AppState<C>>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: "oplg-server",
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
        port: state.addr.port(),
        base_path: state.registry.base_dir().display().to_string(),
        timestamp: state.clock.now_iso8601(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    participant_id: String,
    description: Option<String>,
    participant_pid: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    operation_id: String,
    participant_id: String,
    is_initiator: bool,
    session_id: u64,
    start_time: String,
}

async fn create_operation<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, GatewayError> {
    let participant_id: ParticipantId = body.participant_id.into();
    let pid = body.participant_pid.unwrap_or(0);
    let (managed, session) = state.registry.create_operation(participant_id.clone(), pid).await?;
    let op_id = managed.core.op_id().clone();
    state.remember(&op_id, &participant_id, session);

    if let Some(description) = body.description {
        let _ = managed.core.log(oplg_ledger::LogLevel::Info, &format!("OPERATION_CREATED {description}"));
    }

    info!(operation = %op_id, participant = %participant_id, "operation created via gateway");
    Ok(Json(CreateResponse {
        operation_id: op_id.to_string(),
        participant_id: participant_id.to_string(),
        is_initiator: true,
        session_id: session,
        start_time: managed.core.snapshot().last_heartbeat,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    operation_id: String,
    participant_id: String,
    participant_pid: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse {
    operation_id: String,
    participant_id: String,
    is_initiator: bool,
    session_id: u64,
}

async fn join_operation<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let participant_id: ParticipantId = body.participant_id.into();
    let pid = body.participant_pid.unwrap_or(0);
    let (managed, session) = state.registry.join_operation(op_id.clone(), participant_id.clone(), pid).await?;
    state.remember(&op_id, &participant_id, session);

    Ok(Json(JoinResponse {
        operation_id: op_id.to_string(),
        participant_id: participant_id.to_string(),
        is_initiator: managed.core.is_initiator(),
        session_id: session,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationIdBody {
    operation_id: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn leave_operation<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<OperationIdBody>,
) -> Result<Json<SuccessResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (_, participant_id, session) = state.resolve(&op_id)?;
    state.registry.leave(&op_id, &participant_id, session, true)?;
    state.forget(&op_id, &participant_id);
    Ok(Json(SuccessResponse { success: true }))
}

async fn complete_operation<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<OperationIdBody>,
) -> Result<Json<SuccessResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (_, participant_id, _) = state.resolve(&op_id)?;
    state.registry.complete(&op_id, &participant_id).await?;
    state.forget(&op_id, &participant_id);
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    abort_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_frame_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temp_resource_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_participants: Option<Vec<String>>,
}

async fn heartbeat<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<OperationIdBody>,
) -> Result<Json<HeartbeatResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (managed, _, _) = state.resolve(&op_id)?;
    let outcome = managed.heartbeat.tick().await?;

    let response = match outcome {
        oplg_ledger::TickOutcome::LedgerMissing => {
            HeartbeatResponse {
                success: false,
                reason: Some("No ledger"),
                abort_flag: None,
                call_frame_count: None,
                temp_resource_count: None,
                age_ms: None,
                stale_participants: None,
            }
        }
        oplg_ledger::TickOutcome::Aborted => {
            let operation = managed.core.snapshot();
            HeartbeatResponse {
                success: true,
                reason: None,
                abort_flag: Some(true),
                call_frame_count: Some(operation.call_frames.len()),
                temp_resource_count: Some(operation.temp_resources.len()),
                age_ms: Some(0),
                stale_participants: Some(Vec::new()),
            }
        }
        oplg_ledger::TickOutcome::StaleOther { stale_participants } => {
            let operation = managed.core.snapshot();
            HeartbeatResponse {
                success: true,
                reason: None,
                abort_flag: Some(operation.aborted),
                call_frame_count: Some(operation.call_frames.len()),
                temp_resource_count: Some(operation.temp_resources.len()),
                age_ms: Some(0),
                stale_participants: Some(stale_participants),
            }
        }
        oplg_ledger::TickOutcome::Success(result) => HeartbeatResponse {
            success: true,
            reason: None,
            abort_flag: Some(result.abort_flag),
            call_frame_count: Some(result.call_frame_count),
            temp_resource_count: Some(result.temp_resource_count),
            age_ms: Some(result.age_ms),
            stale_participants: Some(result.stale_participants),
        },
    };
    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbortRequest {
    operation_id: String,
    value: Option<bool>,
}

async fn abort<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<AbortRequest>,
) -> Result<Json<SuccessResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (managed, _, _) = state.resolve(&op_id)?;
    managed.core.set_abort_flag(body.value.unwrap_or(true)).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
struct StateQuery {
    #[serde(rename = "operationId")]
    operation_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateResponse {
    operation_id: String,
    state: String,
    aborted: bool,
    call_frame_count: usize,
    participants: Vec<String>,
}

fn build_state_response<C: Clock>(state: &AppState<C>, op_id: &OperationId) -> Result<Json<StateResponse>, GatewayError> {
    let (managed, _, _) = state.resolve(op_id)?;
    let operation = managed.core.snapshot();
    let mut participants: BTreeSet<String> = operation.call_frames.iter().map(|f| f.participant_id.to_string()).collect();
    participants.insert(operation.initiator_id.to_string());
    Ok(Json(StateResponse {
        operation_id: operation.operation_id.to_string(),
        state: operation.operation_state.to_string(),
        aborted: operation.aborted,
        call_frame_count: operation.call_frames.len(),
        participants: participants.into_iter().collect(),
    }))
}

async fn state_get<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Query(query): Query<StateQuery>,
) -> Result<Json<StateResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&query.operation_id)?;
    build_state_response(&state, &op_id)
}

async fn state_post<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<OperationIdBody>,
) -> Result<Json<StateResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    build_state_response(&state, &op_id)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRequest {
    operation_id: String,
    message: String,
    level: Option<String>,
}

async fn log_line<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<LogRequest>,
) -> Result<Json<SuccessResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (managed, _, _) = state.resolve(&op_id)?;
    let level = body.level.as_deref().map(oplg_ledger::LogLevel::parse).unwrap_or(oplg_ledger::LogLevel::Info);
    managed.core.log(level, &body.message)?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallStartRequest {
    operation_id: String,
    description: Option<String>,
    fail_on_crash: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallStartResponse {
    call_id: String,
    started_at: String,
}

async fn call_start<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<CallStartRequest>,
) -> Result<Json<CallStartResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (managed, _, _) = state.resolve(&op_id)?;
    let call = managed.core.start_call(body.description, body.fail_on_crash.unwrap_or(true)).await?;
    let started_at = managed
        .core
        .snapshot()
        .find_frame(call.call_id())
        .map(|f| f.start_time.clone())
        .unwrap_or_else(|| managed.core.snapshot().last_heartbeat);
    Ok(Json(CallStartResponse { call_id: call.call_id().to_string(), started_at }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallIdBody {
    operation_id: String,
    call_id: String,
}

async fn call_end<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<CallIdBody>,
) -> Result<Json<SuccessResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (managed, _, _) = state.resolve(&op_id)?;
    managed.core.end_call_by_id(&body.call_id.into()).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallFailRequest {
    operation_id: String,
    call_id: String,
    error: Option<String>,
}

async fn call_fail<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<CallFailRequest>,
) -> Result<Json<SuccessResponse>, GatewayError> {
    let op_id = AppState::<C>::parse_operation_id(&body.operation_id)?;
    let (managed, _, _) = state.resolve(&op_id)?;
    managed
        .core
        .fail_call_by_id(&body.call_id.into(), body.error.unwrap_or_else(|| "remote call failed".to_string()))
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
