// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP client mirroring the Remote Gateway's wire contract: a base
//! URL plus whatever identity/session state `create`/`join` hand back.
//! This crate only implements the wire half of that split — the local
//! Session/Join Registry a remote participant layers on top lives in
//! `oplg-ledger` and is reused as-is; this client just gives it something
//! to call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a [`RemoteClient`] call. Gateway errors surface as
/// `{error}` bodies with a status code; we keep the status alongside the
/// message rather than trying to re-derive a [`oplg_core::LedgerError`]
/// variant from a string.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {0} failed: {1}")]
    Transport(String, reqwest::Error),
    #[error("gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// A participant's view of one operation, reached over HTTP rather than the
/// shared filesystem. Holds only a base URL and the identity/session pair
/// the gateway handed back from `create`/`join` — no local lock, state
/// cache, or heartbeat engine; those all live server-side.
pub struct RemoteClient {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(url.clone(), e))?;
        Self::unwrap_response(response).await
    }

    async fn get<Resp: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Resp, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|e| RemoteError::Transport(url.clone(), e))?;
        Self::unwrap_response(response).await
    }

    async fn unwrap_response<Resp: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<Resp, RemoteError> {
        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| RemoteError::Transport(status.to_string(), e))
        } else {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| status.to_string());
            Err(RemoteError::Gateway { status: status.as_u16(), message })
        }
    }

    pub async fn health(&self) -> Result<bool, RemoteError> {
        #[derive(Deserialize)]
        struct Health {
            status: String,
        }
        let health: Health = self.get("/health").await?;
        Ok(health.status == "ok")
    }

    pub async fn create_operation(
        &self,
        participant_id: &str,
        description: Option<&str>,
        participant_pid: Option<u32>,
    ) -> Result<CreateOperationReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            participant_id: &'a str,
            description: Option<&'a str>,
            participant_pid: Option<u32>,
        }
        self.post("/operation/create", &Body { participant_id, description, participant_pid }).await
    }

    pub async fn join_operation(
        &self,
        operation_id: &str,
        participant_id: &str,
        participant_pid: Option<u32>,
    ) -> Result<JoinOperationReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
            participant_id: &'a str,
            participant_pid: Option<u32>,
        }
        self.post("/operation/join", &Body { operation_id, participant_id, participant_pid }).await
    }

    pub async fn leave_operation(&self, operation_id: &str) -> Result<SuccessReply, RemoteError> {
        self.operation_id_call("/operation/leave", operation_id).await
    }

    pub async fn complete_operation(&self, operation_id: &str) -> Result<SuccessReply, RemoteError> {
        self.operation_id_call("/operation/complete", operation_id).await
    }

    pub async fn heartbeat(&self, operation_id: &str) -> Result<HeartbeatReply, RemoteError> {
        self.operation_id_call("/operation/heartbeat", operation_id).await
    }

    pub async fn set_abort_flag(&self, operation_id: &str, value: bool) -> Result<SuccessReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
            value: bool,
        }
        self.post("/operation/abort", &Body { operation_id, value }).await
    }

    pub async fn state(&self, operation_id: &str) -> Result<StateReply, RemoteError> {
        self.get(&format!("/operation/state?operationId={operation_id}")).await
    }

    pub async fn log(&self, operation_id: &str, message: &str, level: Option<&str>) -> Result<SuccessReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
            message: &'a str,
            level: Option<&'a str>,
        }
        self.post("/operation/log", &Body { operation_id, message, level }).await
    }

    pub async fn start_call(
        &self,
        operation_id: &str,
        description: Option<&str>,
        fail_on_crash: Option<bool>,
    ) -> Result<CallStartReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
            description: Option<&'a str>,
            fail_on_crash: Option<bool>,
        }
        self.post("/call/start", &Body { operation_id, description, fail_on_crash }).await
    }

    pub async fn end_call(&self, operation_id: &str, call_id: &str) -> Result<SuccessReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
            call_id: &'a str,
        }
        self.post("/call/end", &Body { operation_id, call_id }).await
    }

    pub async fn fail_call(&self, operation_id: &str, call_id: &str, error: Option<&str>) -> Result<SuccessReply, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
            call_id: &'a str,
            error: Option<&'a str>,
        }
        self.post("/call/fail", &Body { operation_id, call_id, error }).await
    }

    async fn operation_id_call<Resp: for<'de> Deserialize<'de>>(&self, path: &str, operation_id: &str) -> Result<Resp, RemoteError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            operation_id: &'a str,
        }
        self.post(path, &Body { operation_id }).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationReply {
    pub operation_id: String,
    pub participant_id: String,
    pub is_initiator: bool,
    pub session_id: u64,
    pub start_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOperationReply {
    pub operation_id: String,
    pub participant_id: String,
    pub is_initiator: bool,
    pub session_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct SuccessReply {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReply {
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub abort_flag: Option<bool>,
    #[serde(default)]
    pub call_frame_count: Option<usize>,
    #[serde(default)]
    pub temp_resource_count: Option<usize>,
    #[serde(default)]
    pub age_ms: Option<u64>,
    #[serde(default)]
    pub stale_participants: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReply {
    pub operation_id: String,
    pub state: String,
    pub aborted: bool,
    pub call_frame_count: usize,
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStartReply {
    pub call_id: String,
    pub started_at: String,
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
