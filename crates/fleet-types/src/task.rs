//! A2A task lifecycle records (§3, §4.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Canceled)
    }

    /// Valid edges of the task FSM in §4.4.
    pub fn can_transition_to(self, target: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, target),
            (Submitted, Working)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, InputRequired)
                | (Working, Canceled)
                | (InputRequired, Working)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub context_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub state: TaskState,
    pub message_type: String,
    pub summary: String,
    pub payload: serde_json::Value,
    pub response_text: Option<String>,
    pub response_payload: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub from_agent_id: Option<String>,
    pub to_agent_id: Option<String>,
    pub state: Option<TaskState>,
    pub message_type: Option<String>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

pub const MAX_TASK_PAGE: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
        assert!(!TaskState::Working.is_terminal());
    }

    #[test]
    fn legal_edges_only() {
        assert!(TaskState::Submitted.can_transition_to(TaskState::Working));
        assert!(!TaskState::Submitted.can_transition_to(TaskState::Completed));
        assert!(TaskState::InputRequired.can_transition_to(TaskState::Working));
        assert!(!TaskState::Completed.can_transition_to(TaskState::Working));
    }
}
