use fleet_types::{HomeId, HomeState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomeError {
    #[error("home {0} not found")]
    NotFound(HomeId),
    #[error("home {home_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        home_id: HomeId,
        from: HomeState,
        to: HomeState,
    },
    #[error("storage error: {0}")]
    Storage(#[from] fleet_storage::StorageError),
    #[error("home {home_id} cannot be renewed from state {state:?} (requires Leased or Active)")]
    NotRenewable { home_id: HomeId, state: HomeState },
}
