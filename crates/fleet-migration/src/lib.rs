//! C7 Migration engine (§4.7): the thirteen-phase state machine driving an
//! atomic cross-node agent handover, with a single ownership-handoff point
//! at verification success.
//!
//! Grounded on the teacher's `HomeManager`-adjacent `AgentManager` state
//! machine shape for the phase-advance methods, and on its
//! `core/src/monitoring` checksum-free content addressing replaced here
//! with an explicit `sha2` digest (§4.7 "content-addressed snapshot").

pub mod config;
pub mod error;

use std::sync::Arc;

use fleet_audit::AuditLog;
use fleet_home::HomeManager;
use fleet_storage::Storage;
use fleet_types::{
    AuditLevel, HomeId, HomeState, MigrationPhase, MigrationReason, MigrationTicket,
    NodeEndpoint, OwnershipHolder,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use config::MigrationPolicy;
pub use error::MigrationError;

#[derive(Clone)]
pub struct MigrationManager {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
    home: HomeManager,
    policy: MigrationPolicy,
}

impl MigrationManager {
    pub fn new(storage: Arc<dyn Storage>, audit: AuditLog, home: HomeManager, policy: MigrationPolicy) -> Self {
        Self { storage, audit, home, policy }
    }

    pub fn get(&self, migration_id: &str) -> Result<MigrationTicket, MigrationError> {
        self.storage
            .migrations()
            .get(migration_id)?
            .ok_or_else(|| MigrationError::NotFound(migration_id.to_string()))
    }

    fn require_phase(&self, ticket: &MigrationTicket, expected: MigrationPhase) -> Result<(), MigrationError> {
        if ticket.phase != expected {
            return Err(MigrationError::InvalidTransition {
                migration_id: ticket.migration_id.clone(),
                from: ticket.phase,
                to: expected.next_linear().unwrap_or(expected),
            });
        }
        Ok(())
    }

    fn set_phase(
        &self,
        ticket: &MigrationTicket,
        to: MigrationPhase,
        event: &str,
        now: i64,
    ) -> Result<MigrationTicket, MigrationError> {
        self.storage.migrations().update(
            &ticket.migration_id,
            fleet_storage::MigrationPatch {
                phase: Some(to),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(ticket.agent_id.clone()),
            None,
            format!("migration.{event}"),
            AuditLevel::Green,
            serde_json::json!({ "migrationId": ticket.migration_id, "phase": format!("{:?}", to) }),
            Some("ok".to_string()),
            None,
        )?;
        self.get(&ticket.migration_id)
    }

    /// `initiate(agentId, targetNodeId, reason)` (§4.7). Preconditions: the
    /// source home is `Active` or `Leased`; no other non-terminal migration
    /// exists for `agentId`.
    pub fn initiate(
        &self,
        agent_id: impl Into<String>,
        source: NodeEndpoint,
        target: NodeEndpoint,
        reason: MigrationReason,
        now: i64,
    ) -> Result<MigrationTicket, MigrationError> {
        let agent_id = agent_id.into();
        let active = self.storage.migrations().active_for_agent(&agent_id)?;
        if let Some(existing) = active.into_iter().next() {
            return Err(MigrationError::AlreadyMigrating(agent_id, existing.migration_id));
        }

        let source_home_id = HomeId::new(agent_id.clone(), source.node_id.clone());
        let source_home = self.home.get(&source_home_id)?;
        if !matches!(source_home.state, HomeState::Active | HomeState::Leased) {
            return Err(MigrationError::InvalidTransition {
                migration_id: String::new(),
                from: MigrationPhase::Requested,
                to: MigrationPhase::Requested,
            });
        }

        let ticket = MigrationTicket {
            migration_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.clone(),
            source,
            target,
            phase: MigrationPhase::Requested,
            ownership_holder: OwnershipHolder::Source,
            reason,
            created_at: now,
            updated_at: now,
            checksum: None,
            verification_result: None,
            abort_reason: None,
        };
        self.storage.migrations().insert(ticket.clone())?;
        self.audit.record(
            now,
            Some(agent_id),
            Some(source_home_id.to_string()),
            "migration.requested",
            AuditLevel::Green,
            serde_json::json!({ "migrationId": ticket.migration_id, "reason": format!("{:?}", ticket.reason) }),
            Some("ok".to_string()),
            None,
        )?;
        self.get(&ticket.migration_id)
    }

    /// `REQUESTED → AUTHORIZED`: policy gate against the allowed reasons.
    pub fn authorize(&self, migration_id: &str, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Requested)?;
        if !self.policy.allows(ticket.reason) {
            return Err(MigrationError::UnauthorizedReason(ticket.reason));
        }
        self.set_phase(&ticket, MigrationPhase::Authorized, "authorized", now)
    }

    /// `AUTHORIZED → FREEZING`: source home transitions to `FROZEN`.
    pub fn begin_freezing(&self, migration_id: &str, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Authorized)?;
        self.home.transition(
            &self.source_home_id(&ticket),
            HomeState::Frozen,
            "migration freezing",
            "migration-engine",
            now,
        )?;
        self.set_phase(&ticket, MigrationPhase::Freezing, "freezing", now)
    }

    /// `FREEZING → FROZEN`: source confirms no in-flight agent work remains.
    pub fn confirm_frozen(&self, migration_id: &str, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Freezing)?;
        self.set_phase(&ticket, MigrationPhase::Frozen, "frozen", now)
    }

    /// `FROZEN → SNAPSHOTTING`: hashes `snapshot_bytes` into a
    /// content-addressed checksum recorded on the ticket.
    pub fn take_snapshot(&self, migration_id: &str, snapshot_bytes: &[u8], now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Frozen)?;
        let checksum = hex::encode(Sha256::digest(snapshot_bytes));
        self.storage.migrations().update(
            migration_id,
            fleet_storage::MigrationPatch {
                phase: Some(MigrationPhase::Snapshotting),
                checksum: Some(Some(checksum.clone())),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(ticket.agent_id.clone()),
            None,
            "migration.snapshotting",
            AuditLevel::Green,
            serde_json::json!({ "migrationId": migration_id, "checksum": checksum }),
            Some("ok".to_string()),
            None,
        )?;
        self.get(migration_id)
    }

    /// `SNAPSHOTTING → TRANSFERRING`: source home transitions to `MIGRATING`.
    pub fn begin_transfer(&self, migration_id: &str, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Snapshotting)?;
        self.home.transition(
            &self.source_home_id(&ticket),
            HomeState::Migrating,
            "migration transferring",
            "migration-engine",
            now,
        )?;
        self.set_phase(&ticket, MigrationPhase::Transferring, "transferring", now)
    }

    /// `TRANSFERRING → VERIFYING`: target confirms it received all bytes.
    pub fn ready_for_verification(&self, migration_id: &str, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Transferring)?;
        self.set_phase(&ticket, MigrationPhase::Verifying, "verifying", now)
    }

    /// The single ownership-handoff point (§4.7). On success, sets
    /// `ownershipHolder = target` and advances to `REHYDRATING`. On
    /// failure, aborts and unwinds the `VERIFYING` side effect.
    pub fn handle_verification(
        &self,
        migration_id: &str,
        verified: bool,
        computed_checksum: Option<&str>,
        failure_reason: Option<String>,
        now: i64,
    ) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Verifying)?;

        let checksum_matches = verified
            && ticket.checksum.as_deref().is_some()
            && computed_checksum == ticket.checksum.as_deref();

        if checksum_matches {
            self.storage.migrations().update(
                migration_id,
                fleet_storage::MigrationPatch {
                    phase: Some(MigrationPhase::Rehydrating),
                    ownership_holder: Some(OwnershipHolder::Target),
                    verification_result: Some(Some(true)),
                    updated_at: now,
                    ..Default::default()
                },
            )?;
            self.audit.record(
                now,
                Some(ticket.agent_id.clone()),
                None,
                "migration.verified",
                AuditLevel::Green,
                serde_json::json!({ "migrationId": migration_id }),
                Some("ok".to_string()),
                None,
            )?;
            return self.get(migration_id);
        }

        let reason = failure_reason.unwrap_or_else(|| "verification failed".to_string());
        self.apply_abort_side_effects(&ticket, &reason, now)?;
        self.storage.migrations().update(
            migration_id,
            fleet_storage::MigrationPatch {
                phase: Some(MigrationPhase::Aborted),
                verification_result: Some(Some(false)),
                abort_reason: Some(Some(reason.clone())),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(ticket.agent_id.clone()),
            None,
            "migration.verification_failed",
            AuditLevel::Red,
            serde_json::json!({ "migrationId": migration_id, "reason": reason }),
            Some("aborted".to_string()),
            None,
        )?;
        self.get(migration_id)
    }

    /// `REHYDRATING → FINALIZING → COMPLETED`: retires the source home and
    /// registers a new home at `new_node` as the authoritative location.
    pub fn complete(&self, migration_id: &str, new_node: NodeEndpoint, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        self.require_phase(&ticket, MigrationPhase::Rehydrating)?;

        self.home.transition(
            &self.source_home_id(&ticket),
            HomeState::Retired,
            "migration completed",
            "migration-engine",
            now,
        )?;

        let new_home_id = HomeId::new(ticket.agent_id.clone(), new_node.node_id.clone());
        let new_home = fleet_types::Home {
            home_id: new_home_id.clone(),
            state: HomeState::Active,
            lease_expires_at: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        };
        self.storage.homes().insert(new_home)?;
        self.audit.record(
            now,
            Some(ticket.agent_id.clone()),
            Some(new_home_id.to_string()),
            "migration.rehydrated",
            AuditLevel::Green,
            serde_json::json!({ "migrationId": migration_id, "newHomeId": new_home_id.to_string() }),
            Some("ok".to_string()),
            None,
        )?;

        self.set_phase(&ticket, MigrationPhase::Finalizing, "finalizing", now)?;
        self.set_phase(&ticket, MigrationPhase::Completed, "completed", now)
    }

    /// Aborts a non-terminal, pre-handoff migration, unwinding the
    /// phase-specific home side effect. Fails [`MigrationError::TerminalState`]
    /// on an already-terminal ticket and
    /// [`MigrationError::PostHandoffRollback`] once ownership has moved to
    /// the target.
    pub fn rollback(&self, migration_id: &str, reason: impl Into<String>, now: i64) -> Result<MigrationTicket, MigrationError> {
        let ticket = self.get(migration_id)?;
        if ticket.phase.is_terminal() {
            return Err(MigrationError::TerminalState(migration_id.to_string()));
        }
        if matches!(ticket.phase, MigrationPhase::Rehydrating | MigrationPhase::Finalizing) {
            return Err(MigrationError::PostHandoffRollback(migration_id.to_string()));
        }

        let reason = reason.into();
        self.apply_abort_side_effects(&ticket, &reason, now)?;
        self.storage.migrations().update(
            migration_id,
            fleet_storage::MigrationPatch {
                phase: Some(MigrationPhase::Aborted),
                abort_reason: Some(Some(reason.clone())),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(ticket.agent_id.clone()),
            None,
            "migration.rollback",
            AuditLevel::Yellow,
            serde_json::json!({ "migrationId": migration_id, "fromPhase": format!("{:?}", ticket.phase), "reason": reason }),
            Some("aborted".to_string()),
            None,
        )?;
        self.get(migration_id)
    }

    /// Undoes the home-state side effect of whichever phase `ticket` is
    /// currently in, per §4.7 "Rollback". A no-op for phases with no side
    /// effect yet (`REQUESTED`, `AUTHORIZED`). The home transition reason
    /// carries the caller's own abort/failure reason (scenario S4:
    /// `handleVerification(..., failureReason="CHECKSUM_MISMATCH")` must
    /// produce the home transition reason `rollback: CHECKSUM_MISMATCH`).
    fn apply_abort_side_effects(&self, ticket: &MigrationTicket, reason: &str, now: i64) -> Result<(), MigrationError> {
        use MigrationPhase::*;
        match ticket.phase {
            Requested | Authorized => {}
            Freezing | Frozen | Snapshotting | Transferring | Verifying => {
                self.home.transition(
                    &self.source_home_id(ticket),
                    HomeState::Leased,
                    format!("rollback: {reason}"),
                    "migration-engine",
                    now,
                )?;
            }
            Rehydrating | Finalizing | Completed | Aborted => {}
        }
        Ok(())
    }

    fn source_home_id(&self, ticket: &MigrationTicket) -> HomeId {
        HomeId::new(ticket.agent_id.clone(), ticket.source.node_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_home::LeaseConfig;
    use fleet_storage::MemoryStorage;
    use fleet_types::HomeState;

    fn setup() -> (MigrationManager, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let audit = AuditLog::new(storage.clone());
        let home = HomeManager::new(storage.clone(), audit.clone(), LeaseConfig::default());

        let home_id = HomeId::new("alice", "src");
        home.ensure_home(&home_id, 0).unwrap();
        home.transition(&home_id, HomeState::Provisioning, "boot", "sysadmin", 0).unwrap();
        home.transition(&home_id, HomeState::Idle, "ready", "sysadmin", 0).unwrap();
        home.transition(&home_id, HomeState::Active, "work", "alice", 0).unwrap();

        let mgr = MigrationManager::new(storage.clone(), audit, home, MigrationPolicy::default());
        (mgr, storage)
    }

    fn endpoints() -> (NodeEndpoint, NodeEndpoint) {
        (
            NodeEndpoint { node_id: "src".into(), endpoint: "http://src".into() },
            NodeEndpoint { node_id: "dst".into(), endpoint: "http://dst".into() },
        )
    }

    #[test]
    fn happy_path_transfers_ownership_exactly_once() {
        let (mgr, storage) = setup();
        let (source, target) = endpoints();
        let ticket = mgr
            .initiate("alice", source, target.clone(), MigrationReason::OrchestratorRebalance, 0)
            .unwrap();
        assert_eq!(ticket.ownership_holder, OwnershipHolder::Source);

        let ticket = mgr.authorize(&ticket.migration_id, 1).unwrap();
        let ticket = mgr.begin_freezing(&ticket.migration_id, 2).unwrap();
        assert_eq!(
            storage.homes().get(&HomeId::new("alice", "src")).unwrap().unwrap().state,
            HomeState::Frozen
        );
        let ticket = mgr.confirm_frozen(&ticket.migration_id, 3).unwrap();
        let ticket = mgr.take_snapshot(&ticket.migration_id, b"agent-state-blob", 4).unwrap();
        assert!(ticket.checksum.is_some());
        let ticket = mgr.begin_transfer(&ticket.migration_id, 5).unwrap();
        let ticket = mgr.ready_for_verification(&ticket.migration_id, 6).unwrap();

        let checksum = ticket.checksum.clone().unwrap();
        let ticket = mgr
            .handle_verification(&ticket.migration_id, true, Some(&checksum), None, 7)
            .unwrap();
        assert_eq!(ticket.ownership_holder, OwnershipHolder::Target);
        assert_eq!(ticket.phase, MigrationPhase::Rehydrating);

        let ticket = mgr.complete(&ticket.migration_id, target, 8).unwrap();
        assert_eq!(ticket.phase, MigrationPhase::Completed);
        assert_eq!(
            storage.homes().get(&HomeId::new("alice", "src")).unwrap().unwrap().state,
            HomeState::Retired
        );
        assert_eq!(
            storage.homes().get(&HomeId::new("alice", "dst")).unwrap().unwrap().state,
            HomeState::Active
        );
    }

    #[test]
    fn verification_checksum_mismatch_aborts_and_restores_home() {
        let (mgr, storage) = setup();
        let (source, target) = endpoints();
        let ticket = mgr.initiate("alice", source, target, MigrationReason::NodeRetiring, 0).unwrap();
        let ticket = mgr.authorize(&ticket.migration_id, 1).unwrap();
        let ticket = mgr.begin_freezing(&ticket.migration_id, 2).unwrap();
        let ticket = mgr.confirm_frozen(&ticket.migration_id, 3).unwrap();
        let ticket = mgr.take_snapshot(&ticket.migration_id, b"blob", 4).unwrap();
        let ticket = mgr.begin_transfer(&ticket.migration_id, 5).unwrap();
        let ticket = mgr.ready_for_verification(&ticket.migration_id, 6).unwrap();

        let ticket = mgr
            .handle_verification(
                &ticket.migration_id,
                true,
                Some("wrong-checksum"),
                Some("CHECKSUM_MISMATCH".to_string()),
                7,
            )
            .unwrap();
        assert_eq!(ticket.phase, MigrationPhase::Aborted);
        assert_eq!(ticket.ownership_holder, OwnershipHolder::Source);
        let home_id = HomeId::new("alice", "src");
        assert_eq!(storage.homes().get(&home_id).unwrap().unwrap().state, HomeState::Leased);

        // Scenario S4 (spec.md §8): the home transition reason must carry
        // the verification failure reason as `rollback: <reason>`.
        let last_transition = storage
            .transitions()
            .list_for(&home_id, None)
            .unwrap()
            .into_iter()
            .last()
            .unwrap();
        assert_eq!(last_transition.reason, "rollback: CHECKSUM_MISMATCH");
    }

    #[test]
    fn rollback_during_snapshotting_restores_home_to_leased() {
        let (mgr, storage) = setup();
        let (source, target) = endpoints();
        let ticket = mgr.initiate("alice", source, target, MigrationReason::ResourceNeed, 0).unwrap();
        let ticket = mgr.authorize(&ticket.migration_id, 1).unwrap();
        let ticket = mgr.begin_freezing(&ticket.migration_id, 2).unwrap();

        let ticket = mgr.rollback(&ticket.migration_id, "operator cancelled", 3).unwrap();
        assert_eq!(ticket.phase, MigrationPhase::Aborted);
        assert_eq!(
            storage.homes().get(&HomeId::new("alice", "src")).unwrap().unwrap().state,
            HomeState::Leased
        );
    }

    #[test]
    fn rollback_after_ownership_handoff_is_rejected() {
        let (mgr, _storage) = setup();
        let (source, target) = endpoints();
        let ticket = mgr.initiate("alice", source, target.clone(), MigrationReason::LeaseMigration, 0).unwrap();
        let ticket = mgr.authorize(&ticket.migration_id, 1).unwrap();
        let ticket = mgr.begin_freezing(&ticket.migration_id, 2).unwrap();
        let ticket = mgr.confirm_frozen(&ticket.migration_id, 3).unwrap();
        let ticket = mgr.take_snapshot(&ticket.migration_id, b"blob", 4).unwrap();
        let ticket = mgr.begin_transfer(&ticket.migration_id, 5).unwrap();
        let ticket = mgr.ready_for_verification(&ticket.migration_id, 6).unwrap();
        let checksum = ticket.checksum.clone().unwrap();
        let ticket = mgr
            .handle_verification(&ticket.migration_id, true, Some(&checksum), None, 7)
            .unwrap();

        let err = mgr.rollback(&ticket.migration_id, "too late", 8).unwrap_err();
        assert!(matches!(err, MigrationError::PostHandoffRollback(_)));
    }

    #[test]
    fn second_migration_for_same_agent_is_rejected() {
        let (mgr, _storage) = setup();
        let (source, target) = endpoints();
        mgr.initiate("alice", source.clone(), target.clone(), MigrationReason::AgentRequest, 0).unwrap();
        let err = mgr
            .initiate("alice", source, target, MigrationReason::AgentRequest, 1)
            .unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyMigrating(_, _)));
    }
}
