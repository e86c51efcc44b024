//! C4 Task store (§4.4): the six-state A2A request lifecycle plus the
//! fire-and-forget dispatch contract.
//!
//! Grounded on the teacher's `AgentCommunicationHub::send_message` for the
//! "hand the envelope to the hub, keep going" shape
//! (`agents/src/communication/mod.rs`), generalized here into a
//! spawn-a-continuation pattern per §5/§9 ("Fire-and-forget over
//! async/await"): the synchronous caller only ever waits on a durable
//! insert; the outbound A2A call and its terminal state update happen in a
//! detached `tokio::spawn` that never retains caller context across the
//! suspension point.

pub mod error;

use std::sync::Arc;

use fleet_a2a::{A2aClient, A2aError, A2aRequest};
use fleet_audit::AuditLog;
use fleet_storage::{Storage, TaskPatch};
use fleet_types::{now_ms, AuditLevel, Task, TaskFilter, TaskState, MAX_TASK_PAGE};
use tracing::{info, warn};
use uuid::Uuid;

pub use error::TaskError;

#[derive(Clone)]
pub struct TaskManager {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
    a2a: Arc<dyn A2aClient>,
}

impl TaskManager {
    pub fn new(storage: Arc<dyn Storage>, audit: AuditLog, a2a: Arc<dyn A2aClient>) -> Self {
        Self { storage, audit, a2a }
    }

    pub fn get(&self, task_id: &str) -> Result<Task, TaskError> {
        self.storage
            .tasks()
            .get(task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let mut capped = filter.clone();
        capped.limit = Some(capped.limit.unwrap_or(MAX_TASK_PAGE).min(MAX_TASK_PAGE));
        Ok(self.storage.tasks().list(&capped)?)
    }

    /// The `message` tool's fire-and-forget dispatch contract (§4.4):
    /// inserts a `submitted` task, transitions it to `working`, and returns
    /// the `taskId` to the caller immediately. The outbound call and its
    /// terminal update happen in a detached task.
    pub fn dispatch(
        &self,
        from_agent_id: impl Into<String>,
        to_agent_id: impl Into<String>,
        message_type: impl Into<String>,
        summary: impl Into<String>,
        payload: serde_json::Value,
        context_id: Option<String>,
    ) -> Result<String, TaskError> {
        let now = now_ms();
        let from_agent_id = from_agent_id.into();
        let to_agent_id = to_agent_id.into();
        let task_id = Uuid::new_v4().to_string();
        let task = Task {
            task_id: task_id.clone(),
            context_id: context_id.unwrap_or_else(|| task_id.clone()),
            from_agent_id: from_agent_id.clone(),
            to_agent_id: to_agent_id.clone(),
            state: TaskState::Submitted,
            message_type: message_type.into(),
            summary: summary.into(),
            payload: payload.clone(),
            response_text: None,
            response_payload: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.storage.tasks().insert(task)?;
        self.storage.tasks().update(
            &task_id,
            TaskPatch {
                state: Some(TaskState::Working),
                updated_at: now,
                ..Default::default()
            },
        )?;

        self.spawn_continuation(
            task_id.clone(),
            A2aRequest {
                from_agent_id,
                to_agent_id,
                message: payload.to_string(),
                data_parts: Some(payload),
            },
        );

        Ok(task_id)
    }

    /// `taskRespond` (§6, §4.4 "Input-required response"). Only the task's
    /// `toAgentId` may call this; the task must be `input-required`.
    /// Transitions to `working`, stores the response, and dispatches a
    /// follow-up message back to `fromAgentId` (also fire-and-forget).
    pub fn respond_to_input_required(
        &self,
        task_id: &str,
        caller_agent_id: &str,
        response_text: impl Into<String>,
    ) -> Result<Task, TaskError> {
        let task = self.get(task_id)?;
        if task.to_agent_id != caller_agent_id {
            return Err(TaskError::PermissionDenied);
        }
        if task.state != TaskState::InputRequired {
            return Err(TaskError::NotAwaitingInput(task_id.to_string()));
        }
        let response_text = response_text.into();
        let now = now_ms();
        self.storage.tasks().update(
            task_id,
            TaskPatch {
                state: Some(TaskState::Working),
                response_text: Some(Some(response_text.clone())),
                updated_at: now,
                ..Default::default()
            },
        )?;

        self.spawn_continuation(
            task_id.to_string(),
            A2aRequest {
                from_agent_id: task.to_agent_id.clone(),
                to_agent_id: task.from_agent_id.clone(),
                message: response_text,
                data_parts: None,
            },
        );

        self.get(task_id)
    }

    /// Explicit terminal/in-progress transition, used by responders that
    /// are not going through `taskRespond` (e.g. marking a task `failed` or
    /// `canceled` directly). `completedAt` is set iff `to` is terminal.
    pub fn transition(&self, task_id: &str, to: TaskState) -> Result<Task, TaskError> {
        let task = self.get(task_id)?;
        if !task.state.can_transition_to(to) {
            return Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.state,
                to,
            });
        }
        let now = now_ms();
        self.storage.tasks().update(
            task_id,
            TaskPatch {
                state: Some(to),
                completed_at: Some(if to.is_terminal() { Some(now) } else { None }),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.get(task_id)
    }

    fn spawn_continuation(&self, task_id: String, request: A2aRequest) {
        let storage = self.storage.clone();
        let audit = self.audit.clone();
        let a2a = self.a2a.clone();
        tokio::spawn(async move {
            let outcome = a2a.send(request).await;
            let now = now_ms();
            match outcome {
                Ok(response) => {
                    info!(task_id, "a2a dispatch completed");
                    let _ = storage.tasks().update(
                        &task_id,
                        TaskPatch {
                            state: Some(TaskState::Completed),
                            response_text: Some(Some(response.response.clone())),
                            response_payload: Some(response.artifacts.first().cloned()),
                            completed_at: Some(Some(now)),
                            updated_at: now,
                        },
                    );
                    let _ = audit.record(
                        now,
                        None,
                        None,
                        "task.completed",
                        AuditLevel::Green,
                        serde_json::json!({ "taskId": task_id }),
                        Some("ok".to_string()),
                        None,
                    );
                }
                Err(err) => record_failure(&storage, &audit, &task_id, now, &err),
            }
        });
    }
}

fn record_failure(storage: &Arc<dyn Storage>, audit: &AuditLog, task_id: &str, now: i64, err: &A2aError) {
    warn!(task_id, error = %err, "a2a dispatch failed");
    let _ = storage.tasks().update(
        task_id,
        TaskPatch {
            state: Some(TaskState::Failed),
            completed_at: Some(Some(now)),
            updated_at: now,
            ..Default::default()
        },
    );
    let _ = audit.record(
        now,
        None,
        None,
        "task.failed",
        AuditLevel::Yellow,
        serde_json::json!({ "taskId": task_id, "error": err.to_string() }),
        Some("error".to_string()),
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_a2a::{FailingA2aClient, RecordingA2aClient};
    use fleet_storage::MemoryStorage;
    use std::time::Duration;

    fn manager(a2a: Arc<dyn A2aClient>) -> TaskManager {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        TaskManager::new(storage.clone(), AuditLog::new(storage), a2a)
    }

    #[tokio::test]
    async fn dispatch_returns_immediately_then_completes() {
        let mgr = manager(Arc::new(RecordingA2aClient::new()));
        let task_id = mgr
            .dispatch("alice", "bob", "chat", "hello", serde_json::json!({"text": "hi"}), None)
            .unwrap();

        let immediate = mgr.get(&task_id).unwrap();
        assert_eq!(immediate.state, TaskState::Working);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = mgr.get(&task_id).unwrap();
        assert_eq!(settled.state, TaskState::Completed);
        assert!(settled.completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_dispatch_transitions_to_failed_without_blocking_caller() {
        let mgr = manager(Arc::new(FailingA2aClient {
            reason: "timeout".into(),
        }));
        let task_id = mgr
            .dispatch("alice", "bob", "chat", "hello", serde_json::json!({}), None)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = mgr.get(&task_id).unwrap();
        assert_eq!(settled.state, TaskState::Failed);
        assert!(settled.completed_at.is_some());
    }

    #[tokio::test]
    async fn only_recipient_may_respond_to_input_required() {
        let mgr = manager(Arc::new(RecordingA2aClient::new()));
        let task_id = mgr
            .dispatch("alice", "bob", "chat", "hello", serde_json::json!({}), None)
            .unwrap();
        mgr.transition(&task_id, TaskState::InputRequired).unwrap();

        let err = mgr
            .respond_to_input_required(&task_id, "mallory", "not my task")
            .unwrap_err();
        assert!(matches!(err, TaskError::PermissionDenied));

        let task = mgr
            .respond_to_input_required(&task_id, "bob", "here's the info")
            .unwrap();
        assert_eq!(task.state, TaskState::Working);
        assert_eq!(task.response_text.as_deref(), Some("here's the info"));
    }
}
