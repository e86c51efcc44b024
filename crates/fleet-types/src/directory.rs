//! Agent directory entries backing the `discover`/`updateCard` tools (§11).
//!
//! Grounded on the teacher's `AgentManager`/`LayerStats` bookkeeping and
//! `noa_agents::registry::AgentRegistry` — here flattened into one record
//! since the fleet's directory, unlike the teacher's layered hierarchy, is
//! a single flat namespace of agent cards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Orchestrator,
    Sysadmin,
}

impl Role {
    pub fn can_migrate(self) -> bool {
        matches!(self, Role::Orchestrator | Role::Sysadmin)
    }

    pub fn can_manage_lifecycle(self) -> bool {
        matches!(self, Role::Orchestrator | Role::Sysadmin)
    }

    pub fn can_restart_gateway(self) -> bool {
        matches!(self, Role::Sysadmin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub agent_id: String,
    pub node_id: String,
    pub name: String,
    pub description: String,
    pub role: Role,
    pub skills: Vec<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverFilter {
    pub query: Option<String>,
    pub role: Option<Role>,
    pub skill: Option<String>,
    pub limit: Option<usize>,
}
