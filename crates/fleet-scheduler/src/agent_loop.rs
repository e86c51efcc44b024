//! Sleep/wake state for the work-loop scheduler (§4.6 "Sleep/wake state").

use std::sync::Arc;

use fleet_audit::AuditLog;
use fleet_storage::{AgentLoopPatch, Storage};
use fleet_types::{AgentLoopRecord, AuditLevel, LoopState};

use crate::error::SchedulerError;

#[derive(Clone)]
pub struct AgentLoopManager {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
}

impl AgentLoopManager {
    pub fn new(storage: Arc<dyn Storage>, audit: AuditLog) -> Self {
        Self { storage, audit }
    }

    pub fn get(&self, agent_id: &str) -> Result<Option<AgentLoopRecord>, SchedulerError> {
        Ok(self.storage.agent_loop().get(agent_id)?)
    }

    /// Returns the agent's loop record, creating a fresh `AWAKE` one if
    /// this is the agent's first appearance in the loop store.
    pub fn ensure_record(&self, agent_id: &str, now: i64) -> Result<AgentLoopRecord, SchedulerError> {
        if let Some(record) = self.storage.agent_loop().get(agent_id)? {
            return Ok(record);
        }
        let record = AgentLoopRecord::new_awake(agent_id.to_string(), now);
        self.storage.agent_loop().upsert(record.clone())?;
        Ok(record)
    }

    /// Agents eligible for a periodic tick (§4.6 step 1): strictly `AWAKE`,
    /// excluding `REACTIVE` (which only receives direct-trigger pulses) and
    /// `SLEEP`. The underlying store's `list_awake` also returns `REACTIVE`
    /// records (useful for other callers), so this filters once more here.
    pub fn list_awake(&self) -> Result<Vec<AgentLoopRecord>, SchedulerError> {
        Ok(self
            .storage
            .agent_loop()
            .list_awake()?
            .into_iter()
            .filter(|r| r.state == LoopState::Awake)
            .collect())
    }

    /// `sleep(agentId, reason)`: requires AWAKE.
    pub fn sleep(&self, agent_id: &str, reason: impl Into<String>, now: i64) -> Result<AgentLoopRecord, SchedulerError> {
        let record = self
            .get(agent_id)?
            .ok_or_else(|| SchedulerError::NotFound(agent_id.to_string()))?;
        if record.state != LoopState::Awake {
            return Err(SchedulerError::NotAwake(agent_id.to_string()));
        }
        let reason = reason.into();
        self.storage.agent_loop().update(
            agent_id,
            AgentLoopPatch {
                state: Some(LoopState::Sleep),
                slept_at: Some(Some(now)),
                sleep_reason: Some(Some(reason.clone())),
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(agent_id.to_string()),
            None,
            "agent.sleep",
            AuditLevel::Green,
            serde_json::json!({ "reason": reason }),
            Some("ok".to_string()),
            None,
        )?;
        self.get(agent_id)?.ok_or_else(|| SchedulerError::NotFound(agent_id.to_string()))
    }

    /// Wakes the agent unconditionally: direct task, `@mention`, explicit
    /// wake call, or the agent's own channel post (§4.6 "Wake triggers").
    /// A no-op (returns the existing record) if already AWAKE or REACTIVE.
    pub fn wake(&self, agent_id: &str, trigger: &str, now: i64) -> Result<AgentLoopRecord, SchedulerError> {
        let record = self.ensure_record(agent_id, now)?;
        if record.state != LoopState::Sleep {
            return Ok(record);
        }
        self.storage.agent_loop().update(
            agent_id,
            AgentLoopPatch {
                state: Some(LoopState::Awake),
                slept_at: Some(None),
                sleep_reason: Some(None),
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(agent_id.to_string()),
            None,
            "agent-mention-wake",
            AuditLevel::Green,
            serde_json::json!({ "trigger": trigger }),
            Some("ok".to_string()),
            None,
        )?;
        self.get(agent_id)?.ok_or_else(|| SchedulerError::NotFound(agent_id.to_string()))
    }

    pub fn set_reactive(&self, agent_id: &str, now: i64) -> Result<AgentLoopRecord, SchedulerError> {
        self.ensure_record(agent_id, now)?;
        self.storage
            .agent_loop()
            .update(agent_id, AgentLoopPatch { state: Some(LoopState::Reactive), ..Default::default() })?;
        self.get(agent_id)?.ok_or_else(|| SchedulerError::NotFound(agent_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_storage::MemoryStorage;

    fn manager() -> AgentLoopManager {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        AgentLoopManager::new(storage.clone(), AuditLog::new(storage))
    }

    #[test]
    fn sleep_then_mention_wakes() {
        let mgr = manager();
        mgr.ensure_record("bob", 0).unwrap();
        let slept = mgr.sleep("bob", "done", 10).unwrap();
        assert_eq!(slept.state, LoopState::Sleep);

        let awake = mgr.wake("bob", "mention", 20).unwrap();
        assert_eq!(awake.state, LoopState::Awake);
        assert!(awake.slept_at.is_none());
    }

    #[test]
    fn sleep_requires_awake() {
        let mgr = manager();
        mgr.ensure_record("bob", 0).unwrap();
        mgr.sleep("bob", "done", 10).unwrap();
        let err = mgr.sleep("bob", "again", 20).unwrap_err();
        assert!(matches!(err, SchedulerError::NotAwake(_)));
    }

    #[test]
    fn waking_an_already_awake_agent_is_a_noop() {
        let mgr = manager();
        let first = mgr.ensure_record("bob", 0).unwrap();
        let woken = mgr.wake("bob", "mention", 10).unwrap();
        assert_eq!(woken.awakened_at, first.awakened_at);
    }
}
