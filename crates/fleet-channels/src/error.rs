use fleet_types::ChannelId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} not found")]
    NotFound(ChannelId),
    #[error("channel {0} already exists")]
    AlreadyExists(ChannelId),
    #[error("channel {0} is archived and read-only")]
    Archived(ChannelId),
    #[error("{agent_id} is not a member of channel {channel_id}")]
    NotMember { channel_id: ChannelId, agent_id: String },
    #[error("channel {0} has no pending archive to confirm")]
    ArchiveNotPending(ChannelId),
    #[error("bridge {0} not found")]
    BridgeNotFound(String),
    #[error("an active bridge already exists for this (platform, externalChannelId)")]
    DuplicateBridge,
    #[error("storage error: {0}")]
    Storage(#[from] fleet_storage::StorageError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] fleet_scheduler::SchedulerError),
}
