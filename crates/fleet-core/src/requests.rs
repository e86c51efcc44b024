//! Typed request variants for the tool surface (§9 "Dynamic parameter
//! payloads → typed variants"): the gateway hands the core a loosely-typed
//! parameter map per call; this module is the one place that map is
//! validated into a tagged struct. Unknown fields are ignored (`serde`'s
//! default); a missing required field surfaces as [`CoreError::Validation`]
//! rather than panicking, matching §7's "no retry" validation class.
//!
//! Grounded on the teacher's per-tool request/response struct pairs
//! (`RunCommandRequest`, `EditFileRequest`, ... in
//! `server/tools_agent/src/api.rs`); field names use `camelCase` to match
//! the wire shape the tool table in §6 documents (`targetAgentId`,
//! `durationMs`, ...).

use serde::de::DeserializeOwned;
use serde::Deserialize;

use fleet_types::{BridgePlatform, MigrationReason, Role};

use crate::error::CoreError;

/// Parses a loosely-typed parameter map into `T`. The sole entry point
/// every tool method uses to cross the dynamic-payload boundary.
pub fn parse<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, CoreError> {
    serde_json::from_value(params).map_err(|err| CoreError::Validation(err.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub agent_id: Option<String>,
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaseAction {
    Request,
    Renew,
    Release,
    Freeze,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRequest {
    pub action: LeaseAction,
    pub node_id: Option<String>,
    pub home_id: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub agent_id: Option<String>,
    pub home_id: Option<String>,
    pub level: Option<fleet_types::AuditLevel>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub agent_id: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub to: String,
    pub message: String,
    #[serde(default)]
    pub context_data: Option<serde_json::Value>,
    #[serde(default)]
    pub context_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCreateRequest {
    pub channel_id: String,
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPostRequest {
    pub channel_id: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub notify: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelReadRequest {
    pub channel_id: String,
    pub since_seq: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelListRequest {
    pub member_id: Option<String>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAssignRequest {
    pub channel_id: String,
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArchiveRequest {
    pub channel_id: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArchiveReadyRequest {
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub query: Option<String>,
    pub role: Option<Role>,
    pub skill: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryRequest {
    pub from_agent_id: Option<String>,
    pub to_agent_id: Option<String>,
    pub message_type: Option<String>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRespondRequest {
    pub task_id: String,
    pub response_text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateRequest {
    pub target_agent_id: String,
    pub target_node_id: String,
    #[serde(default)]
    pub reason: Option<MigrationReason>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeAction {
    Create,
    Pause,
    Resume,
    Remove,
    List,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub action: BridgeAction,
    pub channel_id: String,
    pub bridge_id: Option<String>,
    pub platform: Option<BridgePlatform>,
    pub external_channel_id: Option<String>,
    pub account_id: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub agent_id: String,
    pub node_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_agent_role")]
    pub role: Role,
}

fn default_agent_role() -> Role {
    Role::Agent
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecommissionAgentRequest {
    pub agent_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_ignored() {
        let req: ProvisionRequest = parse(serde_json::json!({
            "agentId": "alice",
            "nodeId": "n1",
            "_callerAgentId": "alice",
            "somethingUnexpected": 42,
        }))
        .unwrap();
        assert_eq!(req.agent_id, "alice");
        assert_eq!(req.node_id, "n1");
    }

    #[test]
    fn missing_required_field_fails_validation() {
        let err = parse::<ProvisionRequest>(serde_json::json!({ "agentId": "alice" })).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn lease_action_parses_from_lower_camel_case() {
        let req: LeaseRequest = parse(serde_json::json!({
            "action": "renew",
            "homeId": "alice@n1",
            "durationMs": 3_600_000,
        }))
        .unwrap();
        assert_eq!(req.action, LeaseAction::Renew);
        assert_eq!(req.duration_ms, Some(3_600_000));
    }
}
