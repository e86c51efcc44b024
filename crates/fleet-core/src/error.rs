//! The error taxonomy of §7, layered over the typed errors each component
//! crate already returns. [`CoreError::code`] is the stable string every
//! `ToolOutcome::Err` carries — callers match on it, not on the `Debug`
//! rendering of whichever crate's error produced it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("role required: {0}")]
    RoleRequired(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Home(#[from] fleet_home::HomeError),
    #[error(transparent)]
    Task(#[from] fleet_tasks::TaskError),
    #[error(transparent)]
    Channel(#[from] fleet_channels::ChannelError),
    #[error(transparent)]
    Scheduler(#[from] fleet_scheduler::SchedulerError),
    #[error(transparent)]
    Migration(#[from] fleet_migration::MigrationError),
    #[error(transparent)]
    Storage(#[from] fleet_storage::StorageError),
}

impl CoreError {
    /// The taxonomy code from §7, surfaced on the wire via
    /// [`crate::outcome::ToolOutcome::Err`].
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "Validation",
            CoreError::PermissionDenied(_) => "PermissionDenied",
            CoreError::RoleRequired(_) => "RoleRequired",
            CoreError::NotFound(_) => "NotFound",
            CoreError::Home(err) => home_code(err),
            CoreError::Task(err) => task_code(err),
            CoreError::Channel(err) => channel_code(err),
            CoreError::Scheduler(_) => "InvalidState",
            CoreError::Migration(err) => migration_code(err),
            CoreError::Storage(_) => "Fatal",
        }
    }
}

fn home_code(err: &fleet_home::HomeError) -> &'static str {
    use fleet_home::HomeError::*;
    match err {
        NotFound(_) => "NotFound",
        InvalidTransition { .. } => "InvalidTransition",
        NotRenewable { .. } => "InvalidState",
        Storage(_) => "Fatal",
    }
}

fn task_code(err: &fleet_tasks::TaskError) -> &'static str {
    use fleet_tasks::TaskError::*;
    match err {
        NotFound(_) => "NotFound",
        InvalidTransition { .. } => "InvalidTransition",
        PermissionDenied => "PermissionDenied",
        NotAwaitingInput(_) => "InvalidState",
        Storage(_) => "Fatal",
    }
}

fn channel_code(err: &fleet_channels::ChannelError) -> &'static str {
    use fleet_channels::ChannelError::*;
    match err {
        NotFound(_) => "NotFound",
        AlreadyExists(_) => "AlreadyExists",
        Archived(_) => "InvalidState",
        NotMember { .. } => "PermissionDenied",
        ArchiveNotPending(_) => "InvalidState",
        BridgeNotFound(_) => "NotFound",
        DuplicateBridge => "DuplicateBridge",
        Storage(_) => "Fatal",
        Scheduler(_) => "Fatal",
    }
}

fn migration_code(err: &fleet_migration::MigrationError) -> &'static str {
    use fleet_migration::MigrationError::*;
    match err {
        NotFound(_) => "NotFound",
        AlreadyMigrating(_, _) => "AlreadyExists",
        InvalidTransition { .. } => "InvalidTransition",
        UnauthorizedReason(_) => "PermissionDenied",
        TerminalState(_) => "TerminalState",
        PostHandoffRollback(_) => "InvalidState",
        ChecksumMismatch(_) => "Validation",
        Home(_) => "Fatal",
        Storage(_) => "Fatal",
    }
}
