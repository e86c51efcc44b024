use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("agent {0} has no loop record")]
    NotFound(String),
    #[error("agent {0} is not awake")]
    NotAwake(String),
    #[error("storage error: {0}")]
    Storage(#[from] fleet_storage::StorageError),
}
