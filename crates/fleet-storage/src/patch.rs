//! Partial-update shapes for each stored entity.
//!
//! Every `update(key, patch)` call in §4.1 takes a bag of fields to overwrite;
//! a `None` field is left untouched. Kept as plain structs (rather than the
//! `impl FnOnce(&mut T)` closures the teacher's in-memory `AgentManager`
//! mutators use directly) so `Store` traits stay object-safe and can be
//! handed around as `&dyn Store`.

use std::collections::HashMap;

use fleet_types::{BridgePlatform, HomeState, MigrationPhase, OwnershipHolder, TaskState};

#[derive(Debug, Clone, Default)]
pub struct HomePatch {
    pub state: Option<HomeState>,
    pub lease_expires_at: Option<Option<i64>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub state: Option<TaskState>,
    pub response_text: Option<Option<String>>,
    pub response_payload: Option<Option<serde_json::Value>>,
    pub completed_at: Option<Option<i64>>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelPatch {
    pub topic: Option<String>,
    pub members: Option<Vec<String>>,
    pub archived: Option<bool>,
    pub archive_ready_members: Option<std::collections::HashSet<String>>,
    pub archiving_started_at: Option<Option<i64>>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct BridgePatch {
    pub platform: Option<BridgePlatform>,
    pub external_channel_id: Option<String>,
    pub account_id: Option<Option<String>>,
    pub webhook_url: Option<Option<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationPatch {
    pub phase: Option<MigrationPhase>,
    pub ownership_holder: Option<OwnershipHolder>,
    pub checksum: Option<Option<String>>,
    pub verification_result: Option<Option<bool>>,
    pub abort_reason: Option<Option<String>>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AgentLoopPatch {
    pub state: Option<fleet_types::LoopState>,
    pub last_tick_at: Option<i64>,
    pub slept_at: Option<Option<i64>>,
    pub sleep_reason: Option<Option<String>>,
}
