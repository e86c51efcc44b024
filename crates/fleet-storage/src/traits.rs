//! Store traits for C1 (§4.1). One trait per record family so each backend
//! can keep its own tree/table layout; `Storage` bundles them behind a single
//! handle that the component crates (`fleet-home`, `fleet-tasks`, ...) hold
//! as `Arc<dyn Storage>`.

use fleet_types::{
    AgentCard, AgentLoopRecord, AuditEntry, AuditFilter, Bridge, Channel, ChannelFilter,
    ChannelId, ChannelMessage, DiscoverFilter, Home, HomeId, HomeTransition, MigrationTicket,
    Task, TaskFilter,
};

use crate::error::StorageError;
use crate::patch::{AgentLoopPatch, BridgePatch, ChannelPatch, HomePatch, MigrationPatch, TaskPatch};

pub trait HomeStore: Send + Sync {
    fn insert(&self, home: Home) -> Result<(), StorageError>;
    fn get(&self, key: &HomeId) -> Result<Option<Home>, StorageError>;
    fn update(&self, key: &HomeId, patch: HomePatch) -> Result<(), StorageError>;
    fn delete(&self, key: &HomeId) -> Result<(), StorageError>;
    fn list(&self) -> Result<Vec<Home>, StorageError>;
}

pub trait TransitionStore: Send + Sync {
    fn append(&self, transition: HomeTransition) -> Result<u64, StorageError>;
    fn list_for(&self, home_id: &HomeId, limit: Option<usize>) -> Result<Vec<HomeTransition>, StorageError>;
}

pub trait AuditStore: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), StorageError>;
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StorageError>;
    fn count(&self, filter: &AuditFilter) -> Result<usize, StorageError>;
}

pub trait TaskStore: Send + Sync {
    fn insert(&self, task: Task) -> Result<(), StorageError>;
    fn get(&self, task_id: &str) -> Result<Option<Task>, StorageError>;
    fn update(&self, task_id: &str, patch: TaskPatch) -> Result<(), StorageError>;
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError>;
}

pub trait ChannelStore: Send + Sync {
    fn insert(&self, channel: Channel) -> Result<(), StorageError>;
    fn get(&self, channel_id: &ChannelId) -> Result<Option<Channel>, StorageError>;
    fn update(&self, channel_id: &ChannelId, patch: ChannelPatch) -> Result<(), StorageError>;
    fn delete(&self, channel_id: &ChannelId) -> Result<(), StorageError>;
    fn list(&self, filter: &ChannelFilter) -> Result<Vec<Channel>, StorageError>;
}

pub trait ChannelMessageStore: Send + Sync {
    fn append(&self, message: ChannelMessage) -> Result<u64, StorageError>;
    fn list(
        &self,
        channel_id: &ChannelId,
        since_seq: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<ChannelMessage>, StorageError>;
    fn next_seq(&self, channel_id: &ChannelId) -> Result<u64, StorageError>;
}

pub trait BridgeStore: Send + Sync {
    fn insert(&self, bridge: Bridge) -> Result<(), StorageError>;
    fn get(&self, bridge_id: &str) -> Result<Option<Bridge>, StorageError>;
    fn update(&self, bridge_id: &str, patch: BridgePatch) -> Result<(), StorageError>;
    fn delete(&self, bridge_id: &str) -> Result<(), StorageError>;
    fn list_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Bridge>, StorageError>;
}

pub trait AgentLoopStore: Send + Sync {
    fn upsert(&self, record: AgentLoopRecord) -> Result<(), StorageError>;
    fn get(&self, agent_id: &str) -> Result<Option<AgentLoopRecord>, StorageError>;
    fn update(&self, agent_id: &str, patch: AgentLoopPatch) -> Result<(), StorageError>;
    fn list_awake(&self) -> Result<Vec<AgentLoopRecord>, StorageError>;
}

pub trait MigrationStore: Send + Sync {
    fn insert(&self, ticket: MigrationTicket) -> Result<(), StorageError>;
    fn get(&self, migration_id: &str) -> Result<Option<MigrationTicket>, StorageError>;
    fn update(&self, migration_id: &str, patch: MigrationPatch) -> Result<(), StorageError>;
    /// Non-terminal tickets for `agent_id` (§4.7 "no other active migration
    /// for this agent").
    fn active_for_agent(&self, agent_id: &str) -> Result<Vec<MigrationTicket>, StorageError>;
}

pub trait DirectoryStore: Send + Sync {
    fn upsert(&self, card: AgentCard) -> Result<(), StorageError>;
    fn get(&self, agent_id: &str) -> Result<Option<AgentCard>, StorageError>;
    fn discover(&self, filter: &DiscoverFilter) -> Result<Vec<AgentCard>, StorageError>;
}

/// The durable handle every component crate depends on. Obtained from
/// [`crate::open`] and shared as `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    fn homes(&self) -> &dyn HomeStore;
    fn transitions(&self) -> &dyn TransitionStore;
    fn audit(&self) -> &dyn AuditStore;
    fn tasks(&self) -> &dyn TaskStore;
    fn channels(&self) -> &dyn ChannelStore;
    fn channel_messages(&self) -> &dyn ChannelMessageStore;
    fn bridges(&self) -> &dyn BridgeStore;
    fn agent_loop(&self) -> &dyn AgentLoopStore;
    fn directory(&self) -> &dyn DirectoryStore;
    fn migrations(&self) -> &dyn MigrationStore;

    /// Flushes any buffered writes. A no-op for the in-memory backend.
    fn flush(&self) -> Result<(), StorageError>;

    /// Idempotent schema bootstrap (§4.1). A no-op for the in-memory
    /// backend; for the durable backend, safe to call on every process
    /// start regardless of whether the data directory already holds a
    /// prior version's trees.
    fn migrate(&self) -> Result<(), StorageError>;

    /// Flushes and releases backend resources (§4.1). Safe to call once at
    /// shutdown; further operations against the handle afterward are not
    /// guaranteed to succeed.
    fn close(&self) -> Result<(), StorageError> {
        self.flush()
    }
}
