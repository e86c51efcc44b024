//! Home residency records and the home state machine's data shape (§3, §4.3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::HomeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HomeState {
    Unassigned,
    Provisioning,
    Idle,
    Leased,
    Active,
    Frozen,
    Migrating,
    Error,
    Retired,
}

impl HomeState {
    /// Valid edges of the home FSM in §4.3. Order mirrors the spec's
    /// transition table so a reviewer can diff the two side by side.
    pub fn allowed_targets(self) -> &'static [HomeState] {
        use HomeState::*;
        match self {
            Unassigned => &[Provisioning, Error, Retired, Frozen],
            Provisioning => &[Idle, Error, Retired, Frozen],
            Idle => &[Leased, Error, Retired, Frozen],
            Leased => &[Active, Idle, Error, Retired, Frozen],
            Active => &[Leased, Idle, Frozen, Migrating, Error, Retired],
            Frozen => &[Leased, Error, Migrating, Retired],
            Migrating => &[Active, Retired, Idle],
            Error => &[Retired, Frozen],
            Retired => &[],
        }
    }

    pub fn can_transition_to(self, target: HomeState) -> bool {
        self.allowed_targets().contains(&target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Home {
    pub home_id: HomeId,
    pub state: HomeState,
    pub lease_expires_at: Option<i64>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Home {
    pub fn new(home_id: HomeId, now: i64) -> Self {
        Self {
            home_id,
            state: HomeState::Unassigned,
            lease_expires_at: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only record of one home state transition (§3 "Home transition").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeTransition {
    pub home_id: HomeId,
    pub from_state: HomeState,
    pub to_state: HomeState,
    pub reason: String,
    pub triggered_by: String,
    pub timestamp: i64,
}
