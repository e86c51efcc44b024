//! Durable sled-backed storage. Grounded on the teacher's `Queue` (one
//! `sled::Tree` per record family, `serde_json::to_vec`/`from_slice` as the
//! wire format, a lexically time-ordered key for append logs) from
//! `agents/src/implementations/_backup/queue.rs`.

use std::path::Path;

use sled::Tree;
use tracing::info;

use fleet_types::{
    AgentCard, AgentLoopRecord, AuditEntry, AuditFilter, Bridge, Channel, ChannelFilter,
    ChannelId, ChannelMessage, DiscoverFilter, Home, HomeId, HomeTransition, MigrationTicket,
    Task, TaskFilter, MAX_AUDIT_PAGE, MAX_TASK_PAGE,
};

use crate::error::StorageError;
use crate::order_key::{make_order_key, parse_timestamp};
use crate::patch::{AgentLoopPatch, BridgePatch, ChannelPatch, HomePatch, MigrationPatch, TaskPatch};
use crate::traits::{
    AgentLoopStore, AuditStore, BridgeStore, ChannelMessageStore, ChannelStore, DirectoryStore,
    HomeStore, MigrationStore, Storage, TaskStore, TransitionStore,
};

pub struct SledStorage {
    homes: Tree,
    transitions: Tree,
    audit: Tree,
    tasks: Tree,
    channels: Tree,
    channel_messages: Tree,
    channel_seq: Tree,
    bridges: Tree,
    agent_loop: Tree,
    directory: Tree,
    migrations: Tree,
    meta: Tree,
}

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const SCHEMA_VERSION: &[u8] = b"1";

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(path)?;
        info!("opened durable fleet storage");
        Ok(Self {
            homes: db.open_tree("homes")?,
            transitions: db.open_tree("transitions")?,
            audit: db.open_tree("audit")?,
            tasks: db.open_tree("tasks")?,
            channels: db.open_tree("channels")?,
            channel_messages: db.open_tree("channel_messages")?,
            channel_seq: db.open_tree("channel_seq")?,
            bridges: db.open_tree("bridges")?,
            agent_loop: db.open_tree("agent_loop")?,
            directory: db.open_tree("directory")?,
            migrations: db.open_tree("migrations")?,
            meta: db.open_tree("meta")?,
        })
    }
}

fn get_json<T: serde::de::DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>, StorageError> {
    tree.get(key)?
        .map(|v| serde_json::from_slice(&v))
        .transpose()
        .map_err(StorageError::from)
}

fn put_json<T: serde::Serialize>(tree: &Tree, key: &[u8], value: &T) -> Result<(), StorageError> {
    tree.insert(key, serde_json::to_vec(value)?)?;
    Ok(())
}

fn scan_all<T: serde::de::DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, StorageError> {
    let mut out = Vec::new();
    for entry in tree.iter() {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(&value)?);
    }
    Ok(out)
}

impl HomeStore for SledStorage {
    fn insert(&self, home: Home) -> Result<(), StorageError> {
        put_json(&self.homes, home.home_id.to_string().as_bytes(), &home)
    }

    fn get(&self, key: &HomeId) -> Result<Option<Home>, StorageError> {
        get_json(&self.homes, key.to_string().as_bytes())
    }

    fn update(&self, key: &HomeId, patch: HomePatch) -> Result<(), StorageError> {
        // §4.1 "Contract for update on nonexistent key": the durable backend
        // silently no-ops, unlike the in-memory backend's NotFound.
        let Some(mut home) = get_json::<Home>(&self.homes, key.to_string().as_bytes())? else {
            return Ok(());
        };
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
        put_json(&self.homes, key.to_string().as_bytes(), &home)
    }

    fn delete(&self, key: &HomeId) -> Result<(), StorageError> {
        self.homes.remove(key.to_string().as_bytes())?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Home>, StorageError> {
        scan_all(&self.homes)
    }
}

impl TransitionStore for SledStorage {
    fn append(&self, transition: HomeTransition) -> Result<u64, StorageError> {
        let key = make_order_key(transition.timestamp, &transition.home_id.to_string());
        put_json(&self.transitions, &key, &transition)?;
        Ok(self.transitions.len() as u64)
    }

    fn list_for(&self, home_id: &HomeId, limit: Option<usize>) -> Result<Vec<HomeTransition>, StorageError> {
        let mut out = Vec::new();
        let limit = limit.unwrap_or(MAX_AUDIT_PAGE).min(MAX_AUDIT_PAGE);
        for entry in self.transitions.iter().rev() {
            let (key, value) = entry?;
            let _ = parse_timestamp(&key)?;
            let transition: HomeTransition = serde_json::from_slice(&value)?;
            if &transition.home_id == home_id {
                out.push(transition);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }
}

impl AuditStore for SledStorage {
    fn append(&self, entry: AuditEntry) -> Result<(), StorageError> {
        let key = make_order_key(entry.timestamp, &entry.id);
        put_json(&self.audit, &key, &entry)
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StorageError> {
        let limit = filter.limit.unwrap_or(MAX_AUDIT_PAGE).min(MAX_AUDIT_PAGE);
        let mut out = Vec::new();
        for entry in self.audit.iter().rev() {
            let (_, value) = entry?;
            let audit_entry: AuditEntry = serde_json::from_slice(&value)?;
            if audit_matches(&audit_entry, filter) {
                out.push(audit_entry);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn count(&self, filter: &AuditFilter) -> Result<usize, StorageError> {
        let mut count = 0;
        for entry in self.audit.iter() {
            let (_, value) = entry?;
            let audit_entry: AuditEntry = serde_json::from_slice(&value)?;
            if audit_matches(&audit_entry, filter) {
                count += 1;
            }
        }
        Ok(count)
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

impl TaskStore for SledStorage {
    fn insert(&self, task: Task) -> Result<(), StorageError> {
        put_json(&self.tasks, task.task_id.as_bytes(), &task)
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        get_json(&self.tasks, task_id.as_bytes())
    }

    fn update(&self, task_id: &str, patch: TaskPatch) -> Result<(), StorageError> {
        let Some(mut task) = get_json::<Task>(&self.tasks, task_id.as_bytes())? else {
            return Ok(());
        };
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
        put_json(&self.tasks, task_id.as_bytes(), &task)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        let limit = filter.limit.unwrap_or(MAX_TASK_PAGE).min(MAX_TASK_PAGE);
        let mut matches: Vec<Task> = scan_all::<Task>(&self.tasks)?
            .into_iter()
            .filter(|t| task_matches(t, filter))
            .collect();
        matches.sort_by_key(|t| std::cmp::Reverse(t.created_at));
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

impl ChannelStore for SledStorage {
    fn insert(&self, channel: Channel) -> Result<(), StorageError> {
        put_json(&self.channels, channel.channel_id.as_str().as_bytes(), &channel)
    }

    fn get(&self, channel_id: &ChannelId) -> Result<Option<Channel>, StorageError> {
        get_json(&self.channels, channel_id.as_str().as_bytes())
    }

    fn update(&self, channel_id: &ChannelId, patch: ChannelPatch) -> Result<(), StorageError> {
        let Some(mut channel) = get_json::<Channel>(&self.channels, channel_id.as_str().as_bytes())? else {
            return Ok(());
        };
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
        put_json(&self.channels, channel_id.as_str().as_bytes(), &channel)
    }

    fn delete(&self, channel_id: &ChannelId) -> Result<(), StorageError> {
        self.channels.remove(channel_id.as_str().as_bytes())?;
        let prefix = format!("{}:", channel_id.as_str());
        for entry in self.channel_messages.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            self.channel_messages.remove(key)?;
        }
        self.channel_seq.remove(channel_id.as_str().as_bytes())?;
        Ok(())
    }

    fn list(&self, filter: &ChannelFilter) -> Result<Vec<Channel>, StorageError> {
        Ok(scan_all::<Channel>(&self.channels)?
            .into_iter()
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
            .collect())
    }
}

impl ChannelMessageStore for SledStorage {
    fn append(&self, message: ChannelMessage) -> Result<u64, StorageError> {
        let key = format!("{}:{:020}", message.channel_id.as_str(), message.seq);
        put_json(&self.channel_messages, key.as_bytes(), &message)?;
        Ok(message.seq)
    }

    fn list(
        &self,
        channel_id: &ChannelId,
        since_seq: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<ChannelMessage>, StorageError> {
        let prefix = format!("{}:", channel_id.as_str());
        let since = since_seq.unwrap_or(0);
        let mut out = Vec::new();
        for entry in self.channel_messages.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            let message: ChannelMessage = serde_json::from_slice(&value)?;
            if message.seq >= since {
                out.push(message);
            }
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn next_seq(&self, channel_id: &ChannelId) -> Result<u64, StorageError> {
        let key = channel_id.as_str().as_bytes();
        // fetch_and_update returns the value from *before* the update.
        let previous_value = self
            .channel_seq
            .fetch_and_update(key, |old| {
                let next = old
                    .map(|bytes| u64::from_be_bytes(bytes.try_into().unwrap_or_default()))
                    .unwrap_or(0)
                    + 1;
                Some(next.to_be_bytes().to_vec())
            })?;
        let previous = previous_value
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or_default()))
            .unwrap_or(0);
        Ok(previous + 1)
    }
}

impl BridgeStore for SledStorage {
    fn insert(&self, bridge: Bridge) -> Result<(), StorageError> {
        put_json(&self.bridges, bridge.bridge_id.as_bytes(), &bridge)
    }

    fn get(&self, bridge_id: &str) -> Result<Option<Bridge>, StorageError> {
        get_json(&self.bridges, bridge_id.as_bytes())
    }

    fn update(&self, bridge_id: &str, patch: BridgePatch) -> Result<(), StorageError> {
        let Some(mut bridge) = get_json::<Bridge>(&self.bridges, bridge_id.as_bytes())? else {
            return Ok(());
        };
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
        put_json(&self.bridges, bridge_id.as_bytes(), &bridge)
    }

    fn delete(&self, bridge_id: &str) -> Result<(), StorageError> {
        self.bridges.remove(bridge_id.as_bytes())?;
        Ok(())
    }

    fn list_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Bridge>, StorageError> {
        Ok(scan_all::<Bridge>(&self.bridges)?
            .into_iter()
            .filter(|b| &b.channel_id == channel_id)
            .collect())
    }
}

impl AgentLoopStore for SledStorage {
    fn upsert(&self, record: AgentLoopRecord) -> Result<(), StorageError> {
        put_json(&self.agent_loop, record.agent_id.as_bytes(), &record)
    }

    fn get(&self, agent_id: &str) -> Result<Option<AgentLoopRecord>, StorageError> {
        get_json(&self.agent_loop, agent_id.as_bytes())
    }

    fn update(&self, agent_id: &str, patch: AgentLoopPatch) -> Result<(), StorageError> {
        let Some(mut record) = get_json::<AgentLoopRecord>(&self.agent_loop, agent_id.as_bytes())? else {
            return Ok(());
        };
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
        put_json(&self.agent_loop, agent_id.as_bytes(), &record)
    }

    fn list_awake(&self) -> Result<Vec<AgentLoopRecord>, StorageError> {
        Ok(scan_all::<AgentLoopRecord>(&self.agent_loop)?
            .into_iter()
            .filter(|r| matches!(r.state, fleet_types::LoopState::Awake | fleet_types::LoopState::Reactive))
            .collect())
    }
}

impl DirectoryStore for SledStorage {
    fn upsert(&self, card: AgentCard) -> Result<(), StorageError> {
        put_json(&self.directory, card.agent_id.as_bytes(), &card)
    }

    fn get(&self, agent_id: &str) -> Result<Option<AgentCard>, StorageError> {
        get_json(&self.directory, agent_id.as_bytes())
    }

    fn discover(&self, filter: &DiscoverFilter) -> Result<Vec<AgentCard>, StorageError> {
        let mut matches: Vec<AgentCard> = scan_all::<AgentCard>(&self.directory)?
            .into_iter()
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
            .collect();
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}

impl MigrationStore for SledStorage {
    fn insert(&self, ticket: MigrationTicket) -> Result<(), StorageError> {
        put_json(&self.migrations, ticket.migration_id.as_bytes(), &ticket)
    }

    fn get(&self, migration_id: &str) -> Result<Option<MigrationTicket>, StorageError> {
        get_json(&self.migrations, migration_id.as_bytes())
    }

    fn update(&self, migration_id: &str, patch: MigrationPatch) -> Result<(), StorageError> {
        let Some(mut ticket) = get_json::<MigrationTicket>(&self.migrations, migration_id.as_bytes())? else {
            return Ok(());
        };
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
        put_json(&self.migrations, migration_id.as_bytes(), &ticket)
    }

    fn active_for_agent(&self, agent_id: &str) -> Result<Vec<MigrationTicket>, StorageError> {
        Ok(scan_all::<MigrationTicket>(&self.migrations)?
            .into_iter()
            .filter(|t| t.agent_id == agent_id && !t.phase.is_terminal())
            .collect())
    }
}

impl Storage for SledStorage {
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
        self.homes.flush()?;
        self.transitions.flush()?;
        self.audit.flush()?;
        self.tasks.flush()?;
        self.channels.flush()?;
        self.channel_messages.flush()?;
        self.bridges.flush()?;
        self.agent_loop.flush()?;
        self.directory.flush()?;
        self.migrations.flush()?;
        self.meta.flush()?;
        Ok(())
    }

    /// Idempotent schema bootstrap (§4.1): every tree is already opened by
    /// [`Self::open`], so this only needs to stamp the schema version on
    /// first run and confirm it matches on subsequent ones.
    fn migrate(&self) -> Result<(), StorageError> {
        match self.meta.get(SCHEMA_VERSION_KEY)? {
            None => {
                self.meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
                info!("durable storage schema initialized at version 1");
            }
            Some(existing) if existing.as_ref() == SCHEMA_VERSION => {}
            Some(_) => {
                info!("durable storage schema already at a newer version; leaving as-is");
            }
        }
        Ok(())
    }
}
