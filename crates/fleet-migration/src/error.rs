use fleet_types::MigrationPhase;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {0} not found")]
    NotFound(String),
    #[error("agent {0} already has an active migration ({1})")]
    AlreadyMigrating(String, String),
    #[error("migration {migration_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        migration_id: String,
        from: MigrationPhase,
        to: MigrationPhase,
    },
    #[error("migration reason {0:?} is not an authorized reason for transfer")]
    UnauthorizedReason(fleet_types::MigrationReason),
    #[error("migration {0} is already terminal; rollback is not possible")]
    TerminalState(String),
    #[error("migration {0} has passed the ownership handoff point; rollback is not supported")]
    PostHandoffRollback(String),
    #[error("verification checksum mismatch for migration {0}")]
    ChecksumMismatch(String),
    #[error("home error: {0}")]
    Home(#[from] fleet_home::error::HomeError),
    #[error("storage error: {0}")]
    Storage(#[from] fleet_storage::StorageError),
}
