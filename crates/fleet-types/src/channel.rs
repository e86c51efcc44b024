//! Channel, channel-message, and bridge records (§3, §4.5).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ids::ChannelId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub topic: String,
    pub created_by: String,
    pub members: Vec<String>,
    pub archived: bool,
    pub archive_ready_members: HashSet<String>,
    pub archiving_started_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Channel {
    pub fn new(channel_id: ChannelId, topic: String, created_by: String, now: i64) -> Self {
        Self {
            channel_id,
            topic,
            created_by: created_by.clone(),
            members: vec![created_by],
            archived: false,
            archive_ready_members: HashSet::new(),
            archiving_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_member(&self, agent_id: &str) -> bool {
        self.members.iter().any(|m| m == agent_id)
    }

    /// True once `archive()` has started the two-phase protocol but it has
    /// not yet been finalized (§3 invariant).
    pub fn archive_pending(&self) -> bool {
        self.archiving_started_at.is_some() && !self.archived
    }

    pub fn add_member(&mut self, agent_id: String) {
        if !self.is_member(&agent_id) {
            self.members.push(agent_id);
        }
    }

    pub fn remove_member(&mut self, agent_id: &str) {
        self.members.retain(|m| m != agent_id);
        self.archive_ready_members.remove(agent_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel_id: ChannelId,
    pub seq: u64,
    pub agent_id: String,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    pub member_id: Option<String>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgePlatform {
    Discord,
    Slack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bridge {
    pub bridge_id: String,
    pub channel_id: ChannelId,
    pub platform: BridgePlatform,
    pub external_channel_id: String,
    pub account_id: Option<String>,
    pub webhook_url: Option<String>,
    pub created_by: String,
    pub created_at: i64,
    pub active: bool,
}
