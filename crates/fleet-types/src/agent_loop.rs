//! The work-loop scheduler's per-agent residency record (§3, §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Awake,
    Reactive,
    Sleep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopRecord {
    pub agent_id: String,
    pub state: LoopState,
    pub awakened_at: i64,
    pub last_tick_at: i64,
    pub slept_at: Option<i64>,
    pub sleep_reason: Option<String>,
}

impl AgentLoopRecord {
    pub fn new_awake(agent_id: String, now: i64) -> Self {
        Self {
            agent_id,
            state: LoopState::Awake,
            awakened_at: now,
            last_tick_at: now,
            slept_at: None,
            sleep_reason: None,
        }
    }
}
