//! The agent directory (§11 supplemented feature): backs the `discover` and
//! `updateCard` tools over [`fleet_storage::DirectoryStore`].
//!
//! Grounded on the teacher's `AgentManager`/`LayerStats` registry shape
//! (`core/src/agents/mod.rs`) and `noa_agents::registry::AgentRegistry`, the
//! same sources [`fleet_types::AgentCard`] is grounded on.

use std::sync::Arc;

use fleet_storage::Storage;
use fleet_types::{AgentCard, DiscoverFilter, Role};

use crate::error::CoreError;

#[derive(Clone)]
pub struct DirectoryManager {
    storage: Arc<dyn Storage>,
}

impl DirectoryManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn get(&self, agent_id: &str) -> Result<AgentCard, CoreError> {
        self.storage
            .directory()
            .get(agent_id)?
            .ok_or_else(|| CoreError::NotFound(format!("agent card {agent_id}")))
    }

    pub fn discover(&self, filter: &DiscoverFilter) -> Result<Vec<AgentCard>, CoreError> {
        Ok(self.storage.directory().discover(filter)?)
    }

    /// Registers or replaces an agent's card, used by `provision` (a fresh
    /// card with the default `Agent` role) and `createAgent` (a privileged
    /// card with a caller-specified role).
    pub fn upsert(
        &self,
        agent_id: impl Into<String>,
        node_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        role: Role,
        skills: Vec<String>,
        now: i64,
    ) -> Result<AgentCard, CoreError> {
        let agent_id = agent_id.into();
        let card = AgentCard {
            agent_id: agent_id.clone(),
            node_id: node_id.into(),
            name: name.into(),
            description: description.into(),
            role,
            skills,
            updated_at: now,
        };
        self.storage.directory().upsert(card.clone())?;
        Ok(card)
    }

    /// `updateCard` (§6): self-update of the caller's own entry. Only the
    /// fields the caller supplied are replaced; `role` and `nodeId` are not
    /// self-editable (role changes go through `createAgent`'s privileged
    /// path).
    pub fn update_card(
        &self,
        caller_agent_id: &str,
        name: Option<String>,
        description: Option<String>,
        skills: Option<Vec<String>>,
        now: i64,
    ) -> Result<AgentCard, CoreError> {
        let mut card = self.get(caller_agent_id)?;
        if let Some(name) = name {
            card.name = name;
        }
        if let Some(description) = description {
            card.description = description;
        }
        if let Some(skills) = skills {
            card.skills = skills;
        }
        card.updated_at = now;
        self.storage.directory().upsert(card.clone())?;
        Ok(card)
    }
}
