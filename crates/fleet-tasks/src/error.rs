use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error("task {task_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        task_id: String,
        from: fleet_types::TaskState,
        to: fleet_types::TaskState,
    },
    #[error("only the task's recipient may respond to it")]
    PermissionDenied,
    #[error("task {0} is not awaiting input")]
    NotAwaitingInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] fleet_storage::StorageError),
}
