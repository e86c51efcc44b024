//! Tool surface and cross-component wiring for the fleet orchestration
//! core (§6, §7, §9). [`FleetCore`] bundles one instance of every
//! component manager and exposes the tool table as plain methods: each
//! takes a caller identity (where the tool is self- or ownership-scoped), a
//! loosely-typed parameter payload, and returns a [`ToolOutcome`] that never
//! panics across the boundary.
//!
//! Grounded on the teacher's `ToolRegistry`/per-tool-handler split
//! (`server/tools_agent/src/api.rs`): one flat struct owning every backing
//! service, one method per tool, no dynamic dispatch table — the gateway
//! that would route a wire call to these methods lives outside this crate
//! per §1.

pub mod directory;
pub mod error;
pub mod metrics;
pub mod outcome;
pub mod requests;

use std::sync::Arc;

use fleet_audit::AuditLog;
use fleet_channels::ChannelManager;
use fleet_home::HomeManager;
use fleet_migration::MigrationManager;
use fleet_scheduler::Scheduler;
use fleet_storage::Storage;
use fleet_tasks::TaskManager;
use fleet_types::{
    now_ms, AgentCard, AgentLoopRecord, AuditEntry, AuditFilter, AuditLevel, Channel,
    ChannelFilter, ChannelId, ChannelMessage, DiscoverFilter, Home, HomeId, HomeState,
    MigrationReason, MigrationTicket, NodeEndpoint, Role, Task, TaskFilter, TaskState,
};
use tracing::{info, warn};

pub use directory::DirectoryManager;
pub use error::CoreError;
pub use metrics::FleetMetrics;
pub use outcome::{run, ToolOutcome};

use requests::{
    parse, AuditRequest, BridgeAction, BridgeRequest, ChannelArchiveReadyRequest,
    ChannelArchiveRequest, ChannelAssignRequest, ChannelCreateRequest, ChannelListRequest,
    ChannelPostRequest, ChannelReadRequest, CreateAgentRequest, DecommissionAgentRequest,
    DiscoverRequest, LeaseAction, LeaseRequest, MessageRequest, MigrateRequest, ProvisionRequest,
    SleepRequest, StatusRequest, TaskQueryRequest, TaskRespondRequest, UpdateCardRequest,
};

#[derive(Clone)]
pub struct FleetCore {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
    home: HomeManager,
    tasks: TaskManager,
    channels: ChannelManager,
    scheduler: Arc<Scheduler>,
    migration: MigrationManager,
    directory: DirectoryManager,
}

impl FleetCore {
    pub fn new(
        storage: Arc<dyn Storage>,
        audit: AuditLog,
        home: HomeManager,
        tasks: TaskManager,
        channels: ChannelManager,
        scheduler: Arc<Scheduler>,
        migration: MigrationManager,
    ) -> Self {
        let directory = DirectoryManager::new(storage.clone());
        Self { storage, audit, home, tasks, channels, scheduler, migration, directory }
    }

    /// The underlying scheduler handle, for the bootstrap binary to
    /// `start()`/`stop()` the tick timer around its own lifecycle.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// `status` (§6): read-only home listing, optionally narrowed to an
    /// `agentId`/`nodeId`.
    pub fn status(&self, params: serde_json::Value) -> ToolOutcome<Vec<Home>> {
        run(|| {
            let req: StatusRequest = parse(params)?;
            Ok(self
                .home
                .list()?
                .into_iter()
                .filter(|h| req.agent_id.as_deref().map_or(true, |a| a == h.home_id.agent_id))
                .filter(|h| req.node_id.as_deref().map_or(true, |n| n == h.home_id.node_id))
                .collect())
        })
    }

    /// `lease` (§6, §4.3): dispatches on `action`. Ownership
    /// (`callerAgentId == homeId.agentId`) is enforced here, not inside
    /// [`HomeManager`], per scenario S2 — a mismatch is rejected before any
    /// state change or `home.transition` audit entry is produced.
    pub fn lease(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<Home> {
        run(|| {
            let req: LeaseRequest = parse(params)?;
            let home_id = resolve_home_id(caller_agent_id, &req.home_id, &req.node_id)?;
            if home_id.agent_id != caller_agent_id {
                warn!(caller_agent_id, %home_id, "lease denied: caller does not own home");
                return Err(CoreError::PermissionDenied(format!(
                    "{caller_agent_id} does not own home {home_id}"
                )));
            }
            let now = now_ms();
            let home = match req.action {
                LeaseAction::Request => self.home.lease(&home_id, req.duration_ms, caller_agent_id, now)?,
                LeaseAction::Renew => self.home.renew(&home_id, req.duration_ms, caller_agent_id, now)?,
                LeaseAction::Release => self.home.release(&home_id, caller_agent_id, now)?,
                LeaseAction::Freeze => {
                    self.home.transition(&home_id, HomeState::Frozen, "caller requested freeze", caller_agent_id, now)?
                }
            };
            Ok(home)
        })
    }

    /// `audit` (§6): read-only audit query.
    pub fn audit(&self, params: serde_json::Value) -> ToolOutcome<Vec<AuditEntry>> {
        run(|| {
            let req: AuditRequest = parse(params)?;
            let filter = AuditFilter {
                agent_id: req.agent_id,
                home_id: req.home_id,
                level: req.level,
                since: req.since,
                limit: req.limit,
            };
            Ok(self.audit.query(&filter)?)
        })
    }

    /// `provision` (§6): creates (or reuses) a home and carries it straight
    /// through to `IDLE`, registering a default-role directory card.
    pub fn provision(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<Home> {
        run(|| {
            let req: ProvisionRequest = parse(params)?;
            let now = now_ms();
            let home_id = HomeId::new(req.agent_id.clone(), req.node_id.clone());
            self.home.ensure_home(&home_id, now)?;
            self.home.transition(&home_id, HomeState::Provisioning, "provision requested", caller_agent_id, now)?;
            let home = self.home.transition(&home_id, HomeState::Idle, "provisioned", caller_agent_id, now)?;
            self.directory.upsert(
                req.agent_id.clone(),
                req.node_id.clone(),
                req.agent_id,
                String::new(),
                Role::Agent,
                Vec::new(),
                now,
            )?;
            Ok(home)
        })
    }

    /// `message` (§6, §4.4): fire-and-forget dispatch to another agent.
    pub fn message(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<String> {
        run(|| {
            let req: MessageRequest = parse(params)?;
            let payload = req.context_data.unwrap_or_else(|| serde_json::json!({ "text": req.message }));
            Ok(self.tasks.dispatch(caller_agent_id, req.to, "chat", req.message, payload, req.context_id)?)
        })
    }

    pub fn channel_create(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<Channel> {
        run(|| {
            let req: ChannelCreateRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            Ok(self.channels.create(channel_id, req.topic, caller_agent_id, now_ms())?)
        })
    }

    pub fn channel_post(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<ChannelMessage> {
        run(|| {
            let req: ChannelPostRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            Ok(self.channels.post(&channel_id, caller_agent_id, req.content, req.notify, now_ms())?)
        })
    }

    pub fn channel_read(&self, params: serde_json::Value) -> ToolOutcome<Vec<ChannelMessage>> {
        run(|| {
            let req: ChannelReadRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            Ok(self.channels.read(&channel_id, req.since_seq, req.limit)?)
        })
    }

    pub fn channel_list(&self, params: serde_json::Value) -> ToolOutcome<Vec<Channel>> {
        run(|| {
            let req: ChannelListRequest = parse(params)?;
            let filter = ChannelFilter { member_id: req.member_id, archived: req.archived };
            Ok(self.channels.list(&filter)?)
        })
    }

    pub fn channel_assign(&self, params: serde_json::Value) -> ToolOutcome<Channel> {
        run(|| {
            let req: ChannelAssignRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            Ok(self.channels.assign_members(&channel_id, &req.add, &req.remove, now_ms())?)
        })
    }

    pub fn channel_archive(&self, params: serde_json::Value) -> ToolOutcome<ArchiveStatusView> {
        run(|| {
            let req: ChannelArchiveRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            Ok(self.channels.archive(&channel_id, req.force, now_ms())?.into())
        })
    }

    pub fn channel_archive_ready(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<ArchiveStatusView> {
        run(|| {
            let req: ChannelArchiveReadyRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            Ok(self.channels.archive_ready(&channel_id, caller_agent_id, now_ms())?.into())
        })
    }

    /// `bridge` (§6, §4.5.5): dispatches on `action`. Returns a `Value`
    /// rather than one fixed type since `list` yields a collection and the
    /// other actions yield a single bridge (or nothing, for `remove`).
    pub fn bridge(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<serde_json::Value> {
        run(|| {
            let req: BridgeRequest = parse(params)?;
            let channel_id = parse_channel_id(&req.channel_id)?;
            let value = match req.action {
                BridgeAction::Create => {
                    let platform = req
                        .platform
                        .ok_or_else(|| CoreError::Validation("platform is required".to_string()))?;
                    let external_channel_id = req
                        .external_channel_id
                        .ok_or_else(|| CoreError::Validation("externalChannelId is required".to_string()))?;
                    let bridge = self.channels.create_bridge(
                        &channel_id,
                        platform,
                        external_channel_id,
                        req.account_id,
                        req.webhook_url,
                        caller_agent_id,
                        now_ms(),
                    )?;
                    to_value(&bridge)?
                }
                BridgeAction::Pause => to_value(&self.channels.pause_bridge(&require_bridge_id(&req)?)?)?,
                BridgeAction::Resume => to_value(&self.channels.resume_bridge(&require_bridge_id(&req)?)?)?,
                BridgeAction::Remove => {
                    let bridge_id = require_bridge_id(&req)?;
                    self.channels.remove_bridge(&bridge_id)?;
                    serde_json::json!({ "removed": bridge_id })
                }
                BridgeAction::List => to_value(&self.channels.list_bridges(&channel_id)?)?,
            };
            Ok(value)
        })
    }

    pub fn discover(&self, params: serde_json::Value) -> ToolOutcome<Vec<AgentCard>> {
        run(|| {
            let req: DiscoverRequest = parse(params)?;
            let filter = DiscoverFilter { query: req.query, role: req.role, skill: req.skill, limit: req.limit };
            Ok(self.directory.discover(&filter)?)
        })
    }

    /// `tasks` (§6): the active/general task query.
    pub fn tasks(&self, params: serde_json::Value) -> ToolOutcome<Vec<Task>> {
        run(|| {
            let req: TaskQueryRequest = parse(params)?;
            Ok(self.tasks.list(&task_filter(&req, None))?)
        })
    }

    /// `history` (§6): scoped to terminal (`completed`/`failed`/`canceled`)
    /// tasks. `TaskFilter` only matches a single state at a time, so this
    /// queries each terminal state and merges, newest-`updatedAt` first.
    pub fn history(&self, params: serde_json::Value) -> ToolOutcome<Vec<Task>> {
        run(|| {
            let req: TaskQueryRequest = parse(params)?;
            let mut merged = Vec::new();
            for state in [TaskState::Completed, TaskState::Failed, TaskState::Canceled] {
                merged.extend(self.tasks.list(&task_filter(&req, Some(state)))?);
            }
            merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            if let Some(limit) = req.limit {
                merged.truncate(limit);
            }
            Ok(merged)
        })
    }

    /// `taskRespond` (§6, §4.4): only the task's `toAgentId` may call this.
    pub fn task_respond(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<Task> {
        run(|| {
            let req: TaskRespondRequest = parse(params)?;
            Ok(self.tasks.respond_to_input_required(&req.task_id, caller_agent_id, req.response_text)?)
        })
    }

    /// `migrate` (§6, §4.7): role-gated to `Orchestrator`/`Sysadmin`
    /// (`Role::can_migrate`). The tool request carries no explicit source
    /// node, so the source endpoint is derived from the target agent's
    /// current `ACTIVE`/`LEASED` home.
    pub fn migrate(&self, caller_role: Role, params: serde_json::Value) -> ToolOutcome<MigrationTicket> {
        run(|| {
            if !caller_role.can_migrate() {
                return Err(CoreError::RoleRequired("orchestrator or sysadmin".to_string()));
            }
            let req: MigrateRequest = parse(params)?;
            let source_home = self
                .home
                .list()?
                .into_iter()
                .find(|h| {
                    h.home_id.agent_id == req.target_agent_id
                        && matches!(h.state, HomeState::Active | HomeState::Leased)
                })
                .ok_or_else(|| {
                    CoreError::NotFound(format!("no active or leased home for {}", req.target_agent_id))
                })?;
            let source = NodeEndpoint {
                node_id: source_home.home_id.node_id.clone(),
                endpoint: source_home.home_id.node_id.clone(),
            };
            let target = NodeEndpoint { node_id: req.target_node_id.clone(), endpoint: req.target_node_id.clone() };
            let reason = req.reason.unwrap_or(MigrationReason::OrchestratorRebalance);
            Ok(self.migration.initiate(req.target_agent_id, source, target, reason, now_ms())?)
        })
    }

    /// `sleep` (§6, §4.6): self-only — the caller puts itself to sleep.
    pub fn sleep(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<AgentLoopRecord> {
        run(|| {
            let req: SleepRequest = parse(params)?;
            let reason = req.reason.unwrap_or_else(|| "agent requested sleep".to_string());
            Ok(self.scheduler.agent_loop().sleep(caller_agent_id, reason, now_ms())?)
        })
    }

    /// `updateCard` (§6, §11): self-only directory card update.
    pub fn update_card(&self, caller_agent_id: &str, params: serde_json::Value) -> ToolOutcome<AgentCard> {
        run(|| {
            let req: UpdateCardRequest = parse(params)?;
            Ok(self.directory.update_card(caller_agent_id, req.name, req.description, req.skills, now_ms())?)
        })
    }

    /// `createAgent` (§6): role-gated to `Orchestrator`/`Sysadmin`.
    pub fn create_agent(&self, caller_role: Role, params: serde_json::Value) -> ToolOutcome<AgentCard> {
        run(|| {
            if !caller_role.can_manage_lifecycle() {
                return Err(CoreError::RoleRequired("orchestrator or sysadmin".to_string()));
            }
            let req: CreateAgentRequest = parse(params)?;
            let now = now_ms();
            let home_id = HomeId::new(req.agent_id.clone(), req.node_id.clone());
            self.home.ensure_home(&home_id, now)?;
            Ok(self
                .directory
                .upsert(req.agent_id, req.node_id, req.name, req.description, req.role, req.skills, now)?)
        })
    }

    /// `decommissionAgent` (§6): role-gated, and self-decommissioning is
    /// explicitly forbidden regardless of role.
    pub fn decommission_agent(&self, caller_agent_id: &str, caller_role: Role, params: serde_json::Value) -> ToolOutcome<()> {
        run(|| {
            if !caller_role.can_manage_lifecycle() {
                return Err(CoreError::RoleRequired("orchestrator or sysadmin".to_string()));
            }
            let req: DecommissionAgentRequest = parse(params)?;
            if req.agent_id == caller_agent_id {
                return Err(CoreError::PermissionDenied("cannot decommission self".to_string()));
            }
            let now = now_ms();
            for home in self.home.list()? {
                if home.home_id.agent_id == req.agent_id && !matches!(home.state, HomeState::Retired) {
                    self.home.transition(&home.home_id, HomeState::Retired, "agent decommissioned", caller_agent_id, now)?;
                }
            }
            Ok(())
        })
    }

    /// `restartGateway` (§6): the gateway process itself is out of scope
    /// (§1), so this is a role-gated, audit-only acknowledgment with no
    /// restart mechanism behind it.
    pub fn restart_gateway(&self, caller_agent_id: &str, caller_role: Role) -> ToolOutcome<()> {
        run(|| {
            if !caller_role.can_restart_gateway() {
                return Err(CoreError::RoleRequired("sysadmin".to_string()));
            }
            self.audit.record(
                now_ms(),
                Some(caller_agent_id.to_string()),
                None,
                "gateway.restart_requested",
                AuditLevel::Yellow,
                serde_json::json!({}),
                Some("acknowledged".to_string()),
                None,
            )?;
            Ok(())
        })
    }

    /// Observability snapshot (§11 supplemented feature), not named in the
    /// §6 tool table but exposed alongside it for operational use.
    pub fn metrics(&self) -> ToolOutcome<FleetMetrics> {
        run(|| metrics::snapshot(&self.storage, now_ms()))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ArchiveStatusView {
    pub archived: bool,
    pub ready: usize,
    pub total: usize,
    pub waiting: Vec<String>,
}

impl From<fleet_channels::ArchiveStatus> for ArchiveStatusView {
    fn from(status: fleet_channels::ArchiveStatus) -> Self {
        Self { archived: status.archived, ready: status.ready, total: status.total, waiting: status.waiting }
    }
}

fn resolve_home_id(
    caller_agent_id: &str,
    home_id: &Option<String>,
    node_id: &Option<String>,
) -> Result<HomeId, CoreError> {
    if let Some(raw) = home_id {
        return HomeId::parse(raw).map_err(|err| CoreError::Validation(err.to_string()));
    }
    let node_id = node_id
        .clone()
        .ok_or_else(|| CoreError::Validation("homeId or nodeId is required".to_string()))?;
    Ok(HomeId::new(caller_agent_id, node_id))
}

fn parse_channel_id(raw: &str) -> Result<ChannelId, CoreError> {
    ChannelId::parse(raw).map_err(|err| CoreError::Validation(err.to_string()))
}

fn require_bridge_id(req: &BridgeRequest) -> Result<String, CoreError> {
    req.bridge_id
        .clone()
        .ok_or_else(|| CoreError::Validation("bridgeId is required".to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|err| CoreError::Validation(err.to_string()))
}

fn task_filter(req: &TaskQueryRequest, state: Option<TaskState>) -> TaskFilter {
    TaskFilter {
        from_agent_id: req.from_agent_id.clone(),
        to_agent_id: req.to_agent_id.clone(),
        state,
        message_type: req.message_type.clone(),
        since: req.since,
        limit: req.limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_a2a::RecordingA2aClient;
    use fleet_channels::NullBridgeNotifier;
    use fleet_home::LeaseConfig;
    use fleet_migration::MigrationPolicy;
    use fleet_scheduler::SchedulerConfig;
    use fleet_storage::MemoryStorage;

    fn core() -> FleetCore {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let audit = AuditLog::new(storage.clone());
        let a2a = Arc::new(RecordingA2aClient::new());
        let home = HomeManager::new(storage.clone(), audit.clone(), LeaseConfig::default());
        let tasks = TaskManager::new(storage.clone(), audit.clone(), a2a.clone());
        let scheduler = Arc::new(Scheduler::new(storage.clone(), audit.clone(), a2a, home.clone(), SchedulerConfig::default()));
        let channels = ChannelManager::new(storage.clone(), audit.clone(), scheduler.clone(), Arc::new(NullBridgeNotifier));
        let migration = MigrationManager::new(storage.clone(), audit.clone(), home.clone(), MigrationPolicy::default());
        FleetCore::new(storage, audit, home, tasks, channels, scheduler, migration)
    }

    #[test]
    fn provision_then_status_round_trips() {
        let core = core();
        let outcome = core.provision("sysadmin", serde_json::json!({ "agentId": "alice", "nodeId": "n1" }));
        assert!(outcome.is_ok());

        let outcome = core.status(serde_json::json!({ "agentId": "alice" }));
        match outcome {
            ToolOutcome::Ok { output, .. } => {
                assert_eq!(output.len(), 1);
                assert_eq!(output[0].state, HomeState::Idle);
            }
            ToolOutcome::Err { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn lease_by_non_owner_is_denied_without_state_change() {
        let core = core();
        core.provision("sysadmin", serde_json::json!({ "agentId": "alice", "nodeId": "n1" }));

        let outcome = core.lease(
            "mallory",
            serde_json::json!({ "action": "request", "homeId": "alice@n1", "durationMs": 60_000 }),
        );
        match outcome {
            ToolOutcome::Err { error, .. } => assert_eq!(error.code, "PermissionDenied"),
            ToolOutcome::Ok { .. } => panic!("expected denial"),
        }

        let status = core.status(serde_json::json!({ "agentId": "alice" }));
        match status {
            ToolOutcome::Ok { output, .. } => assert_eq!(output[0].state, HomeState::Idle),
            ToolOutcome::Err { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn lease_by_owner_succeeds_and_renew_extends_it() {
        let core = core();
        core.provision("sysadmin", serde_json::json!({ "agentId": "alice", "nodeId": "n1" }));

        let outcome = core.lease(
            "alice",
            serde_json::json!({ "action": "request", "homeId": "alice@n1", "durationMs": 60_000 }),
        );
        assert!(outcome.is_ok());

        let outcome = core.lease(
            "alice",
            serde_json::json!({ "action": "renew", "homeId": "alice@n1", "durationMs": 120_000 }),
        );
        match outcome {
            ToolOutcome::Ok { output, .. } => assert_eq!(output.state, HomeState::Leased),
            ToolOutcome::Err { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn migrate_requires_orchestrator_or_sysadmin_role() {
        let core = core();
        let outcome = core.migrate(
            Role::Agent,
            serde_json::json!({ "targetAgentId": "alice", "targetNodeId": "n2" }),
        );
        match outcome {
            ToolOutcome::Err { error, .. } => assert_eq!(error.code, "RoleRequired"),
            ToolOutcome::Ok { .. } => panic!("expected role rejection"),
        }
    }

    #[test]
    fn decommission_self_is_rejected() {
        let core = core();
        let outcome = core.decommission_agent(
            "alice",
            Role::Sysadmin,
            serde_json::json!({ "agentId": "alice" }),
        );
        match outcome {
            ToolOutcome::Err { error, .. } => assert_eq!(error.code, "PermissionDenied"),
            ToolOutcome::Ok { .. } => panic!("expected denial"),
        }
    }

    #[test]
    fn missing_required_param_surfaces_validation_error() {
        let core = core();
        let outcome = core.provision("sysadmin", serde_json::json!({ "agentId": "alice" }));
        match outcome {
            ToolOutcome::Err { error, .. } => assert_eq!(error.code, "Validation"),
            ToolOutcome::Ok { .. } => panic!("expected validation error"),
        }
    }
}
