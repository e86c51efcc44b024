//! The A2A (agent-to-agent) client boundary (§6 "Inbound A2A").
//!
//! The fleet core never speaks the wire protocol itself — per §1, the
//! network client and its transport are an external collaborator. This
//! crate fixes the *interface* the core depends on ([`A2aClient`]) plus the
//! message/response shapes that cross it, grounded on the teacher's
//! `AgentCommunicationHub`/`AgentMessage` boundary
//! (`agents/src/communication/mod.rs`): an envelope carrying a typed
//! payload, sent through one async trait method, with canned in-memory
//! doubles (here [`FailingA2aClient`] / [`RecordingA2aClient`]) standing in
//! for the teacher's `broadcast`-channel hub in tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fleet_types::AuditLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Optional structured side-channel data carried alongside a message body
/// (§6: "Messages carry optional structured `dataParts`").
pub type DataParts = serde_json::Value;

/// Triage output shape for the sysadmin-facing `triage-result` artifact
/// (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub level: AuditLevel,
    pub action: String,
    pub reasoning: String,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub requires_human_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aRequest {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub message: String,
    #[serde(default)]
    pub data_parts: Option<DataParts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum A2aState {
    Completed,
    Failed,
    InputRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aResponse {
    pub task_id: String,
    pub state: A2aState,
    pub response: String,
    #[serde(default)]
    pub artifacts: Vec<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum A2aError {
    #[error("a2a transport error: {0}")]
    Transport(String),
    #[error("a2a peer {0} unreachable")]
    Unreachable(String),
}

/// The outbound boundary every dispatching component (`fleet-tasks`,
/// `fleet-scheduler`) holds as `Arc<dyn A2aClient>`. A real implementation
/// lives outside the core (§1); it is expected to perform its own transport
/// timeout and is always called from a spawned continuation, never from a
/// synchronous caller (§5 "Suspension points").
#[async_trait]
pub trait A2aClient: Send + Sync {
    async fn send(&self, request: A2aRequest) -> Result<A2aResponse, A2aError>;
}

/// A double that always fails, useful for exercising failure-path
/// continuations (YELLOW audit, task stays non-terminal) without a real
/// transport.
pub struct FailingA2aClient {
    pub reason: String,
}

#[async_trait]
impl A2aClient for FailingA2aClient {
    async fn send(&self, request: A2aRequest) -> Result<A2aResponse, A2aError> {
        Err(A2aError::Transport(format!(
            "{} (to {})",
            self.reason, request.to_agent_id
        )))
    }
}

/// A double that always succeeds with a canned response, recording every
/// request it saw so tests can assert on dispatch content.
#[derive(Clone, Default)]
pub struct RecordingA2aClient {
    sent: Arc<Mutex<Vec<A2aRequest>>>,
}

impl RecordingA2aClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<A2aRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl A2aClient for RecordingA2aClient {
    async fn send(&self, request: A2aRequest) -> Result<A2aResponse, A2aError> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(A2aResponse {
            task_id: uuid_like(&request),
            state: A2aState::Completed,
            response: "ok".to_string(),
            artifacts: Vec::new(),
        })
    }
}

fn uuid_like(request: &A2aRequest) -> String {
    format!("ack-{}-{}", request.from_agent_id, request.to_agent_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_client_captures_requests() {
        let client = RecordingA2aClient::new();
        let req = A2aRequest {
            from_agent_id: "alice".into(),
            to_agent_id: "bob".into(),
            message: "hi".into(),
            data_parts: None,
        };
        let resp = client.send(req.clone()).await.unwrap();
        assert_eq!(resp.state, A2aState::Completed);
        assert_eq!(client.sent(), vec![req]);
    }

    #[tokio::test]
    async fn failing_client_surfaces_transport_error() {
        let client = FailingA2aClient {
            reason: "timeout".into(),
        };
        let err = client
            .send(A2aRequest {
                from_agent_id: "a".into(),
                to_agent_id: "b".into(),
                message: "x".into(),
                data_parts: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, A2aError::Transport(_)));
    }
}
