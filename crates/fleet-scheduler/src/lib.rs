//! C6 Work-loop scheduler (§4.6): a single cooperative tick loop that
//! periodically drives AWAKE agents, delivers aggregated channel deltas,
//! and exposes an immediate-tick path for mentions.
//!
//! Grounded on the teacher's `AgentCommunicationHub` for the "one shared,
//! cloneable handle wrapping `Arc`-ed interior state" shape
//! (`agents/src/communication/mod.rs`), and on `core/src/world/reconciler.rs`
//! for the non-reentrant periodic-cycle idiom (a single in-flight guard
//! around a scan-then-act pass).

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod jitter;
pub mod payload;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fleet_a2a::{A2aClient, A2aRequest};
use fleet_audit::AuditLog;
use fleet_home::HomeManager;
use fleet_storage::{ChannelFilter, Storage};
use fleet_types::{now_ms, AuditLevel, ChannelId};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use agent_loop::AgentLoopManager;
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use payload::{ChannelDeltaBlock, TickPayload};

/// The boundary other components (`fleet-channels`) depend on to reach the
/// scheduler without it depending back on them (§9 "Cyclic references").
pub trait SchedulerHandle: Send + Sync {
    /// Wakes a SLEEP agent (mention, direct task, explicit call, or the
    /// agent's own post). A no-op if already AWAKE/REACTIVE.
    fn wake(&self, agent_id: &str, trigger: &str) -> Result<(), SchedulerError>;

    /// Requests an immediate, jittered-but-soon dispatch for `agent_id`
    /// carrying at least up to `seq` of `channel_id` (§4.6 "Immediate
    /// tick"). Fire-and-forget; suppressed if already scheduled for that
    /// range or beyond (§4.6 "Per-agent in-flight dedup").
    fn request_immediate_tick(&self, agent_id: &str, channel_id: &ChannelId, seq: u64);

    /// Marks `agent_id` as having already seen everything through `seq` in
    /// `channel_id` without waiting for a tick — used when a poster is
    /// assumed to have seen their own message (§4.5.2).
    fn mark_seen(&self, agent_id: &str, channel_id: &ChannelId, seq: u64);
}

#[derive(Debug, Clone, Copy, Default)]
struct SeqState {
    sent_seq: u64,
    scheduled_seq: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
    a2a: Arc<dyn A2aClient>,
    home: HomeManager,
    agent_loop: AgentLoopManager,
    config: Arc<SchedulerConfig>,
    tracker: Arc<DashMap<(String, ChannelId), SeqState>>,
    cycle_running: Arc<AtomicBool>,
    timer: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        audit: AuditLog,
        a2a: Arc<dyn A2aClient>,
        home: HomeManager,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            agent_loop: AgentLoopManager::new(storage.clone(), audit.clone()),
            storage,
            audit,
            a2a,
            home,
            config: Arc::new(config),
            tracker: Arc::new(DashMap::new()),
            cycle_running: Arc::new(AtomicBool::new(false)),
            timer: Arc::new(AsyncMutex::new(None)),
        }
    }

    pub fn agent_loop(&self) -> &AgentLoopManager {
        &self.agent_loop
    }

    /// Starts the cooperative timer. Idempotent: a second call while a
    /// timer is already running leaves exactly one timer (§8 invariant 8).
    pub async fn start(&self) {
        let mut guard = self.timer.lock().await;
        if guard.is_some() {
            return;
        }
        let this = self.clone();
        let interval_ms = self.config.check_interval_ms;
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                this.run_cycle_if_idle(now_ms()).await;
            }
        }));
    }

    /// Stops the timer. Idempotent; does not cancel dispatches already
    /// in flight (§4.6 "Cancellation & timeouts") — they complete
    /// asynchronously and still apply their `sentSeq` update.
    pub async fn stop(&self) {
        let mut guard = self.timer.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    /// Runs one tick cycle unless a prior cycle is still in progress, in
    /// which case the firing is skipped with a debug log (§4.6 step,
    /// "non-reentrant").
    pub async fn run_cycle_if_idle(&self, now: i64) {
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("skipping tick cycle: previous cycle still in progress");
            return;
        }
        self.run_cycle(now).await;
        self.cycle_running.store(false, Ordering::SeqCst);
    }

    async fn run_cycle(&self, now: i64) {
        // §4.3 "A background sweeper (part of the scheduler or a separate
        // lease reaper)": every cycle, before dispatching ticks, expire
        // LEASED homes whose leaseExpiresAt has passed (§8 invariant 5).
        match self.home.sweep_expired_leases(now) {
            Ok(expired) if !expired.is_empty() => {
                debug!(count = expired.len(), "swept expired leases");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "lease expiry sweep failed"),
        }

        let awake = match self.agent_loop.list_awake() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "failed to list awake agents");
                return;
            }
        };

        let due: Vec<String> = awake
            .into_iter()
            .filter(|r| jitter::due_at(r.last_tick_at, self.config.tick_interval_ms, &r.agent_id) <= now)
            .map(|r| r.agent_id)
            .collect();
        if due.is_empty() {
            return;
        }

        self.clean_stale_session_locks();

        for agent_id in due {
            self.dispatch_agent(&agent_id, now_ms()).await;
            tokio::time::sleep(Duration::from_millis(self.config.inter_dispatch_delay_ms)).await;
        }
    }

    fn clean_stale_session_locks(&self) {
        let Some(dir) = &self.config.sessions_dir else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let threshold = Duration::from_secs(self.config.stale_lock_age_secs);
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if modified.elapsed().map(|age| age > threshold).unwrap_or(false) {
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    /// Builds and sends one agent's tick payload, updating `lastTickAt`
    /// before dispatch (§4.6 step 5) and `sentSeq` per channel only on a
    /// successful send.
    async fn dispatch_agent(&self, agent_id: &str, now: i64) {
        let loop_record = match self.agent_loop.ensure_record(agent_id, now) {
            Ok(r) => r,
            Err(err) => {
                warn!(agent_id, error = %err, "failed to load loop record");
                return;
            }
        };
        if let Err(err) = self.storage.agent_loop().update(
            agent_id,
            fleet_storage::AgentLoopPatch {
                last_tick_at: Some(now),
                ..Default::default()
            },
        ) {
            warn!(agent_id, error = %err, "failed to update lastTickAt");
            return;
        }

        let channels = match self.storage.channels().list(&ChannelFilter {
            member_id: Some(agent_id.to_string()),
            archived: Some(false),
        }) {
            Ok(channels) => channels,
            Err(err) => {
                warn!(agent_id, error = %err, "failed to list member channels");
                return;
            }
        };

        let mut blocks = Vec::new();
        let mut advances: Vec<(ChannelId, u64)> = Vec::new();
        for channel in channels {
            let key = (agent_id.to_string(), channel.channel_id.clone());
            let sent_seq = self.sent_seq_or_init(&key);
            let messages = match self
                .storage
                .channel_messages()
                .list(&channel.channel_id, Some(sent_seq + 1), None)
            {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(agent_id, channel = %channel.channel_id, error = %err, "failed to list channel messages");
                    continue;
                }
            };
            if let Some(block) = payload::build_delta_block(channel.channel_id.clone(), &messages) {
                let mut entry = self.tracker.entry(key.clone()).or_default();
                entry.scheduled_seq = entry.scheduled_seq.max(block.to_seq);
                advances.push((channel.channel_id.clone(), block.to_seq));
                blocks.push(block);
            }
        }

        let tick_payload = TickPayload {
            agent_id: agent_id.to_string(),
            awake_duration_ms: now - loop_record.awakened_at,
            blocks,
        };

        let result = self
            .a2a
            .send(A2aRequest {
                from_agent_id: "system".to_string(),
                to_agent_id: agent_id.to_string(),
                message: tick_payload.render(),
                data_parts: None,
            })
            .await;

        match result {
            Ok(_) => {
                for (channel_id, to_seq) in advances {
                    self.tracker
                        .entry((agent_id.to_string(), channel_id))
                        .or_default()
                        .sent_seq = to_seq;
                }
                info!(agent_id, "tick dispatched");
                let _ = self.audit.record(
                    now,
                    Some(agent_id.to_string()),
                    None,
                    "scheduler.tick",
                    AuditLevel::Green,
                    serde_json::json!({}),
                    Some("ok".to_string()),
                    None,
                );
            }
            Err(err) => {
                warn!(agent_id, error = %err, "tick dispatch failed");
                let _ = self.audit.record(
                    now,
                    Some(agent_id.to_string()),
                    None,
                    "scheduler.tick.failed",
                    AuditLevel::Yellow,
                    serde_json::json!({ "error": err.to_string() }),
                    Some("error".to_string()),
                    None,
                );
            }
        }
    }

    fn sent_seq_or_init(&self, key: &(String, ChannelId)) -> u64 {
        if let Some(state) = self.tracker.get(key) {
            return state.sent_seq;
        }
        // First time this (agent, channel) pair is seen in this process:
        // resume from the current tail rather than replaying the whole log
        // (§9 "rebuild on restart ... set sentSeq(a,c) = max seq in c").
        let max_seq = self
            .storage
            .channel_messages()
            .list(&key.1, None, None)
            .ok()
            .and_then(|messages| messages.last().map(|m| m.seq))
            .unwrap_or(0);
        self.tracker.insert(
            key.clone(),
            SeqState {
                sent_seq: max_seq,
                scheduled_seq: max_seq,
            },
        );
        max_seq
    }
}

impl SchedulerHandle for Scheduler {
    fn wake(&self, agent_id: &str, trigger: &str) -> Result<(), SchedulerError> {
        self.agent_loop.wake(agent_id, trigger, now_ms())?;
        Ok(())
    }

    fn request_immediate_tick(&self, agent_id: &str, channel_id: &ChannelId, seq: u64) {
        let key = (agent_id.to_string(), channel_id.clone());
        {
            let mut entry = self.tracker.entry(key.clone()).or_default();
            if seq <= entry.scheduled_seq {
                debug!(agent_id, %channel_id, seq, "immediate tick suppressed: already scheduled");
                return;
            }
            entry.scheduled_seq = seq;
        }

        let this = self.clone();
        let agent_id = agent_id.to_string();
        let channel_id = channel_id.clone();
        let (min_ms, max_ms) = self.config.immediate_tick_delay_range_ms;
        tokio::spawn(async move {
            let delay = jitter::absorb_delay_ms(&agent_id, channel_id.as_str(), seq, min_ms, max_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let stale = this
                .tracker
                .get(&(agent_id.clone(), channel_id.clone()))
                .map(|state| state.scheduled_seq > seq)
                .unwrap_or(false);
            if stale {
                debug!(agent_id, %channel_id, seq, "immediate tick stale: newer dispatch will cover it");
                return;
            }
            this.dispatch_agent(&agent_id, now_ms()).await;
        });
    }

    fn mark_seen(&self, agent_id: &str, channel_id: &ChannelId, seq: u64) {
        let mut entry = self
            .tracker
            .entry((agent_id.to_string(), channel_id.clone()))
            .or_default();
        entry.sent_seq = entry.sent_seq.max(seq);
        entry.scheduled_seq = entry.scheduled_seq.max(seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_a2a::RecordingA2aClient;
    use fleet_home::LeaseConfig;
    use fleet_storage::{ChannelMessageStore, ChannelStore, MemoryStorage};
    use fleet_types::{Channel, ChannelMessage};
    use std::time::Duration as StdDuration;

    fn storage_with_channel(channel_id: &str, member: &str) -> Arc<dyn Storage> {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let channel_id = ChannelId::parse(channel_id).unwrap();
        let channel = Channel::new(channel_id, "topic".into(), member.to_string(), 0);
        storage.channels().insert(channel).unwrap();
        storage
    }

    fn home_manager(storage: Arc<dyn Storage>, audit: AuditLog) -> HomeManager {
        HomeManager::new(storage, audit, LeaseConfig::default())
    }

    #[tokio::test]
    async fn dispatch_delivers_new_messages_and_advances_sent_seq() {
        let storage = storage_with_channel("proj", "alice");
        let channel_id = ChannelId::parse("proj").unwrap();
        for seq in 1..=3u64 {
            storage
                .channel_messages()
                .append(ChannelMessage {
                    channel_id: channel_id.clone(),
                    seq,
                    agent_id: "alice".into(),
                    content: format!("msg {seq}"),
                    timestamp: seq as i64,
                })
                .unwrap();
        }
        let audit = AuditLog::new(storage.clone());
        let a2a = Arc::new(RecordingA2aClient::new());
        let home = home_manager(storage.clone(), audit.clone());
        let scheduler = Scheduler::new(storage.clone(), audit, a2a.clone(), home, SchedulerConfig::default());
        scheduler.agent_loop().ensure_record("alice", 0).unwrap();

        scheduler.dispatch_agent("alice", 1_000).await;

        let sent = a2a.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains("msg 3"));

        // Second dispatch with no new messages should still send (heartbeat)
        // but report nothing new.
        scheduler.dispatch_agent("alice", 2_000).await;
        assert_eq!(a2a.sent().len(), 2);
        assert!(!a2a.sent()[1].message.contains("seq"));
    }

    #[tokio::test]
    async fn immediate_tick_is_suppressed_for_already_scheduled_seq() {
        let storage = storage_with_channel("proj", "bob");
        let channel_id = ChannelId::parse("proj").unwrap();
        storage
            .channel_messages()
            .append(ChannelMessage {
                channel_id: channel_id.clone(),
                seq: 1,
                agent_id: "alice".into(),
                content: "@bob hi".into(),
                timestamp: 0,
            })
            .unwrap();
        let audit = AuditLog::new(storage.clone());
        let a2a = Arc::new(RecordingA2aClient::new());
        let mut config = SchedulerConfig::default();
        config.immediate_tick_delay_range_ms = (5, 5);
        let home = home_manager(storage.clone(), audit.clone());
        let scheduler = Scheduler::new(storage.clone(), audit, a2a.clone(), home, config);
        scheduler.agent_loop().ensure_record("bob", 0).unwrap();

        scheduler.request_immediate_tick("bob", &channel_id, 1);
        scheduler.request_immediate_tick("bob", &channel_id, 1); // duplicate, suppressed
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(a2a.sent().len(), 1);
    }

    #[tokio::test]
    async fn run_cycle_sweeps_expired_leases_before_dispatching() {
        use fleet_storage::HomeStore;
        use fleet_types::{Home, HomeId, HomeState};

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let audit = AuditLog::new(storage.clone());
        let home_id = HomeId::new("alice", "n1");
        storage
            .homes()
            .insert(Home {
                home_id: home_id.clone(),
                state: HomeState::Leased,
                lease_expires_at: Some(500),
                metadata: Default::default(),
                created_at: 0,
                updated_at: 0,
            })
            .unwrap();
        let a2a = Arc::new(RecordingA2aClient::new());
        let home = home_manager(storage.clone(), audit.clone());
        let scheduler = Scheduler::new(storage.clone(), audit, a2a, home, SchedulerConfig::default());

        scheduler.run_cycle_if_idle(1_000).await;

        let home = storage.homes().get(&home_id).unwrap().unwrap();
        assert_eq!(home.state, HomeState::Idle);
    }
}
