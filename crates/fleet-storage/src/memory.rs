//! In-memory backend. Grounded on the teacher's `AgentManager`/`MessageBroker`
//! pattern of `Arc<RwLock<HashMap<...>>>` tables guarded by `parking_lot`.
//! Used for tests and for nodes configured with `storage.backend = "memory"`
//! (§10.3); data does not survive a process restart.

use std::collections::HashMap;

use parking_lot::RwLock;

use fleet_types::{
    AgentCard, AgentLoopRecord, AuditEntry, AuditFilter, Bridge, Channel, ChannelFilter,
    ChannelId, ChannelMessage, DiscoverFilter, Home, HomeId, HomeTransition, MigrationTicket,
    Task, TaskFilter, MAX_AUDIT_PAGE, MAX_TASK_PAGE,
};

use crate::error::StorageError;
use crate::patch::{AgentLoopPatch, BridgePatch, ChannelPatch, HomePatch, MigrationPatch, TaskPatch};
use crate::traits::{
    AgentLoopStore, AuditStore, BridgeStore, ChannelMessageStore, ChannelStore, DirectoryStore,
    HomeStore, MigrationStore, Storage, TaskStore, TransitionStore,
};

#[derive(Default)]
pub struct MemoryStorage {
    homes: RwLock<HashMap<HomeId, Home>>,
    transitions: RwLock<Vec<HomeTransition>>,
    audit: RwLock<Vec<AuditEntry>>,
    tasks: RwLock<HashMap<String, Task>>,
    channels: RwLock<HashMap<ChannelId, Channel>>,
    channel_messages: RwLock<HashMap<ChannelId, Vec<ChannelMessage>>>,
    bridges: RwLock<HashMap<String, Bridge>>,
    agent_loop: RwLock<HashMap<String, AgentLoopRecord>>,
    directory: RwLock<HashMap<String, AgentCard>>,
    migrations: RwLock<HashMap<String, MigrationTicket>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HomeStore for MemoryStorage {
    fn insert(&self, home: Home) -> Result<(), StorageError> {
        self.homes.write().insert(home.home_id.clone(), home);
        Ok(())
    }

    fn get(&self, key: &HomeId) -> Result<Option<Home>, StorageError> {
        Ok(self.homes.read().get(key).cloned())
    }

    fn update(&self, key: &HomeId, patch: HomePatch) -> Result<(), StorageError> {
        let mut homes = self.homes.write();
        let home = homes.get_mut(key).ok_or(StorageError::NotFound)?;
        if let Some(state) = patch.state {
            home.state = state;
        }
        if let Some(lease) = patch.lease_expires_at {
            home.lease_expires_at = lease;
        }
        if let Some(metadata) = patch.metadata {
            home.metadata = metadata;
        }
        home.updated_at = patch.updated_at;
        Ok(())
    }

    fn delete(&self, key: &HomeId) -> Result<(), StorageError> {
        self.homes.write().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Home>, StorageError> {
        Ok(self.homes.read().values().cloned().collect())
    }
}

impl TransitionStore for MemoryStorage {
    fn append(&self, transition: HomeTransition) -> Result<u64, StorageError> {
        let mut log = self.transitions.write();
        log.push(transition);
        Ok(log.len() as u64)
    }

    fn list_for(&self, home_id: &HomeId, limit: Option<usize>) -> Result<Vec<HomeTransition>, StorageError> {
        let log = self.transitions.read();
        let mut matches: Vec<HomeTransition> = log
            .iter()
            .filter(|t| &t.home_id == home_id)
            .cloned()
            .collect();
        matches.sort_by_key(|t| std::cmp::Reverse(t.timestamp));
        matches.truncate(limit.unwrap_or(MAX_AUDIT_PAGE).min(MAX_AUDIT_PAGE));
        Ok(matches)
    }
}

impl AuditStore for MemoryStorage {
    fn append(&self, entry: AuditEntry) -> Result<(), StorageError> {
        self.audit.write().push(entry);
        Ok(())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StorageError> {
        let log = self.audit.read();
        let mut matches: Vec<AuditEntry> = log
            .iter()
            .filter(|e| audit_matches(e, filter))
            .cloned()
            .collect();
        matches.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        let limit = filter.limit.unwrap_or(MAX_AUDIT_PAGE).min(MAX_AUDIT_PAGE);
        matches.truncate(limit);
        Ok(matches)
    }

    fn count(&self, filter: &AuditFilter) -> Result<usize, StorageError> {
        Ok(self.audit.read().iter().filter(|e| audit_matches(e, filter)).count())
    }
}

fn audit_matches(entry: &AuditEntry, filter: &AuditFilter) -> bool {
    if let Some(agent_id) = &filter.agent_id {
        if entry.agent_id.as_deref() != Some(agent_id.as_str()) {
            return false;
        }
    }
    if let Some(home_id) = &filter.home_id {
        if entry.home_id.as_deref() != Some(home_id.as_str()) {
            return false;
        }
    }
    if let Some(level) = filter.level {
        if entry.level != level {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if entry.timestamp < since {
            return false;
        }
    }
    true
}

impl TaskStore for MemoryStorage {
    fn insert(&self, task: Task) -> Result<(), StorageError> {
        self.tasks.write().insert(task.task_id.clone(), task);
        Ok(())
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        Ok(self.tasks.read().get(task_id).cloned())
    }

    fn update(&self, task_id: &str, patch: TaskPatch) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or(StorageError::NotFound)?;
        if let Some(state) = patch.state {
            task.state = state;
        }
        if let Some(text) = patch.response_text {
            task.response_text = text;
        }
        if let Some(payload) = patch.response_payload {
            task.response_payload = payload;
        }
        if let Some(completed_at) = patch.completed_at {
            task.completed_at = completed_at;
        }
        task.updated_at = patch.updated_at;
        Ok(())
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        let tasks = self.tasks.read();
        let mut matches: Vec<Task> = tasks
            .values()
            .filter(|t| task_matches(t, filter))
            .cloned()
            .collect();
        matches.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        let limit = filter.limit.unwrap_or(MAX_TASK_PAGE).min(MAX_TASK_PAGE);
        matches.truncate(limit);
        Ok(matches)
    }
}

fn task_matches(task: &Task, filter: &TaskFilter) -> bool {
    if let Some(from) = &filter.from_agent_id {
        if &task.from_agent_id != from {
            return false;
        }
    }
    if let Some(to) = &filter.to_agent_id {
        if &task.to_agent_id != to {
            return false;
        }
    }
    if let Some(state) = filter.state {
        if task.state != state {
            return false;
        }
    }
    if let Some(message_type) = &filter.message_type {
        if &task.message_type != message_type {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if task.created_at < since {
            return false;
        }
    }
    true
}

impl ChannelStore for MemoryStorage {
    fn insert(&self, channel: Channel) -> Result<(), StorageError> {
        self.channels.write().insert(channel.channel_id.clone(), channel);
        Ok(())
    }

    fn get(&self, channel_id: &ChannelId) -> Result<Option<Channel>, StorageError> {
        Ok(self.channels.read().get(channel_id).cloned())
    }

    fn update(&self, channel_id: &ChannelId, patch: ChannelPatch) -> Result<(), StorageError> {
        let mut channels = self.channels.write();
        let channel = channels.get_mut(channel_id).ok_or(StorageError::NotFound)?;
        if let Some(topic) = patch.topic {
            channel.topic = topic;
        }
        if let Some(members) = patch.members {
            channel.members = members;
        }
        if let Some(archived) = patch.archived {
            channel.archived = archived;
        }
        if let Some(ready) = patch.archive_ready_members {
            channel.archive_ready_members = ready;
        }
        if let Some(started_at) = patch.archiving_started_at {
            channel.archiving_started_at = started_at;
        }
        channel.updated_at = patch.updated_at;
        Ok(())
    }

    fn delete(&self, channel_id: &ChannelId) -> Result<(), StorageError> {
        self.channels.write().remove(channel_id);
        self.channel_messages.write().remove(channel_id);
        Ok(())
    }

    fn list(&self, filter: &ChannelFilter) -> Result<Vec<Channel>, StorageError> {
        let channels = self.channels.read();
        Ok(channels
            .values()
            .filter(|c| {
                if let Some(member_id) = &filter.member_id {
                    if !c.is_member(member_id) {
                        return false;
                    }
                }
                if let Some(archived) = filter.archived {
                    if c.archived != archived {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect())
    }
}

impl ChannelMessageStore for MemoryStorage {
    fn append(&self, message: ChannelMessage) -> Result<u64, StorageError> {
        let mut messages = self.channel_messages.write();
        let seq = message.seq;
        messages.entry(message.channel_id.clone()).or_default().push(message);
        Ok(seq)
    }

    fn list(
        &self,
        channel_id: &ChannelId,
        since_seq: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<ChannelMessage>, StorageError> {
        let messages = self.channel_messages.read();
        let Some(all) = messages.get(channel_id) else {
            return Ok(Vec::new());
        };
        let since = since_seq.unwrap_or(0);
        let mut matches: Vec<ChannelMessage> =
            all.iter().filter(|m| m.seq >= since).cloned().collect();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    fn next_seq(&self, channel_id: &ChannelId) -> Result<u64, StorageError> {
        let messages = self.channel_messages.read();
        Ok(messages.get(channel_id).map(|m| m.len() as u64).unwrap_or(0) + 1)
    }
}

impl BridgeStore for MemoryStorage {
    fn insert(&self, bridge: Bridge) -> Result<(), StorageError> {
        self.bridges.write().insert(bridge.bridge_id.clone(), bridge);
        Ok(())
    }

    fn get(&self, bridge_id: &str) -> Result<Option<Bridge>, StorageError> {
        Ok(self.bridges.read().get(bridge_id).cloned())
    }

    fn update(&self, bridge_id: &str, patch: BridgePatch) -> Result<(), StorageError> {
        let mut bridges = self.bridges.write();
        let bridge = bridges.get_mut(bridge_id).ok_or(StorageError::NotFound)?;
        if let Some(platform) = patch.platform {
            bridge.platform = platform;
        }
        if let Some(external_id) = patch.external_channel_id {
            bridge.external_channel_id = external_id;
        }
        if let Some(account_id) = patch.account_id {
            bridge.account_id = account_id;
        }
        if let Some(webhook_url) = patch.webhook_url {
            bridge.webhook_url = webhook_url;
        }
        if let Some(active) = patch.active {
            bridge.active = active;
        }
        Ok(())
    }

    fn delete(&self, bridge_id: &str) -> Result<(), StorageError> {
        self.bridges.write().remove(bridge_id);
        Ok(())
    }

    fn list_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Bridge>, StorageError> {
        Ok(self
            .bridges
            .read()
            .values()
            .filter(|b| &b.channel_id == channel_id)
            .cloned()
            .collect())
    }
}

impl AgentLoopStore for MemoryStorage {
    fn upsert(&self, record: AgentLoopRecord) -> Result<(), StorageError> {
        self.agent_loop.write().insert(record.agent_id.clone(), record);
        Ok(())
    }

    fn get(&self, agent_id: &str) -> Result<Option<AgentLoopRecord>, StorageError> {
        Ok(self.agent_loop.read().get(agent_id).cloned())
    }

    fn update(&self, agent_id: &str, patch: AgentLoopPatch) -> Result<(), StorageError> {
        let mut table = self.agent_loop.write();
        let record = table.get_mut(agent_id).ok_or(StorageError::NotFound)?;
        if let Some(state) = patch.state {
            record.state = state;
        }
        if let Some(last_tick_at) = patch.last_tick_at {
            record.last_tick_at = last_tick_at;
        }
        if let Some(slept_at) = patch.slept_at {
            record.slept_at = slept_at;
        }
        if let Some(reason) = patch.sleep_reason {
            record.sleep_reason = reason;
        }
        Ok(())
    }

    fn list_awake(&self) -> Result<Vec<AgentLoopRecord>, StorageError> {
        Ok(self
            .agent_loop
            .read()
            .values()
            .filter(|r| matches!(r.state, fleet_types::LoopState::Awake | fleet_types::LoopState::Reactive))
            .cloned()
            .collect())
    }
}

impl DirectoryStore for MemoryStorage {
    fn upsert(&self, card: AgentCard) -> Result<(), StorageError> {
        self.directory.write().insert(card.agent_id.clone(), card);
        Ok(())
    }

    fn get(&self, agent_id: &str) -> Result<Option<AgentCard>, StorageError> {
        Ok(self.directory.read().get(agent_id).cloned())
    }

    fn discover(&self, filter: &DiscoverFilter) -> Result<Vec<AgentCard>, StorageError> {
        let directory = self.directory.read();
        let mut matches: Vec<AgentCard> = directory
            .values()
            .filter(|card| {
                if let Some(role) = filter.role {
                    if card.role != role {
                        return false;
                    }
                }
                if let Some(skill) = &filter.skill {
                    if !card.skills.iter().any(|s| s == skill) {
                        return false;
                    }
                }
                if let Some(query) = &filter.query {
                    let query = query.to_lowercase();
                    if !card.name.to_lowercase().contains(&query)
                        && !card.description.to_lowercase().contains(&query)
                    {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}

impl MigrationStore for MemoryStorage {
    fn insert(&self, ticket: MigrationTicket) -> Result<(), StorageError> {
        self.migrations.write().insert(ticket.migration_id.clone(), ticket);
        Ok(())
    }

    fn get(&self, migration_id: &str) -> Result<Option<MigrationTicket>, StorageError> {
        Ok(self.migrations.read().get(migration_id).cloned())
    }

    fn update(&self, migration_id: &str, patch: MigrationPatch) -> Result<(), StorageError> {
        let mut migrations = self.migrations.write();
        let ticket = migrations.get_mut(migration_id).ok_or(StorageError::NotFound)?;
        if let Some(phase) = patch.phase {
            ticket.phase = phase;
        }
        if let Some(holder) = patch.ownership_holder {
            ticket.ownership_holder = holder;
        }
        if let Some(checksum) = patch.checksum {
            ticket.checksum = checksum;
        }
        if let Some(result) = patch.verification_result {
            ticket.verification_result = result;
        }
        if let Some(reason) = patch.abort_reason {
            ticket.abort_reason = reason;
        }
        ticket.updated_at = patch.updated_at;
        Ok(())
    }

    fn active_for_agent(&self, agent_id: &str) -> Result<Vec<MigrationTicket>, StorageError> {
        Ok(self
            .migrations
            .read()
            .values()
            .filter(|t| t.agent_id == agent_id && !t.phase.is_terminal())
            .cloned()
            .collect())
    }
}

impl Storage for MemoryStorage {
    fn homes(&self) -> &dyn HomeStore {
        self
    }
    fn transitions(&self) -> &dyn TransitionStore {
        self
    }
    fn audit(&self) -> &dyn AuditStore {
        self
    }
    fn tasks(&self) -> &dyn TaskStore {
        self
    }
    fn channels(&self) -> &dyn ChannelStore {
        self
    }
    fn channel_messages(&self) -> &dyn ChannelMessageStore {
        self
    }
    fn bridges(&self) -> &dyn BridgeStore {
        self
    }
    fn agent_loop(&self) -> &dyn AgentLoopStore {
        self
    }
    fn directory(&self) -> &dyn DirectoryStore {
        self
    }
    fn migrations(&self) -> &dyn MigrationStore {
        self
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn migrate(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
