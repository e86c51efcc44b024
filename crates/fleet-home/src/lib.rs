//! C3 Home manager (§4.3): the lease state machine that tracks which node
//! currently hosts which agent.
//!
//! Grounded on the teacher's `AgentManager` (`core/src/agents/mod.rs`) for
//! the "registry of records guarded by one manager struct" shape, and on its
//! `health_check`/layer-distribution sweep for the periodic lease-expiry
//! sweep here.

pub mod config;
pub mod error;

use std::sync::Arc;

use fleet_audit::AuditLog;
use fleet_storage::{HomePatch, Storage};
use fleet_types::{AuditLevel, Home, HomeId, HomeState, HomeTransition};

pub use config::LeaseConfig;
pub use error::HomeError;

#[derive(Clone)]
pub struct HomeManager {
    storage: Arc<dyn Storage>,
    audit: AuditLog,
    lease: LeaseConfig,
}

impl HomeManager {
    pub fn new(storage: Arc<dyn Storage>, audit: AuditLog, lease: LeaseConfig) -> Self {
        Self { storage, audit, lease }
    }

    pub fn get(&self, home_id: &HomeId) -> Result<Home, HomeError> {
        self.storage
            .homes()
            .get(home_id)?
            .ok_or_else(|| HomeError::NotFound(home_id.clone()))
    }

    pub fn list(&self) -> Result<Vec<Home>, HomeError> {
        Ok(self.storage.homes().list()?)
    }

    /// Creates a fresh `Unassigned` home if one does not already exist for
    /// this `agentId@nodeId` pair; otherwise returns the existing record.
    pub fn ensure_home(&self, home_id: &HomeId, now: i64) -> Result<Home, HomeError> {
        if let Some(home) = self.storage.homes().get(home_id)? {
            return Ok(home);
        }
        let home = Home::new(home_id.clone(), now);
        self.storage.homes().insert(home.clone())?;
        Ok(home)
    }

    /// Moves a home to `to`, recording the transition and an audit entry.
    /// Fails with [`HomeError::InvalidTransition`] if `to` is not one of
    /// `from`'s allowed targets (§4.3).
    pub fn transition(
        &self,
        home_id: &HomeId,
        to: HomeState,
        reason: impl Into<String>,
        triggered_by: impl Into<String>,
        now: i64,
    ) -> Result<Home, HomeError> {
        let home = self.get(home_id)?;
        let reason = reason.into();
        let triggered_by = triggered_by.into();
        if !home.state.can_transition_to(to) {
            return Err(HomeError::InvalidTransition {
                home_id: home_id.clone(),
                from: home.state,
                to,
            });
        }

        // §4.3 "renew requires state ∈ {LEASED, ACTIVE}": the lease clock
        // must survive a LEASED -> ACTIVE handoff, not just be carried
        // within LEASED itself. Only transitions that actually leave the
        // lease-holding family clear it.
        let lease_expires_at = if matches!(to, HomeState::Leased | HomeState::Active) {
            home.lease_expires_at
        } else {
            None
        };

        self.storage.homes().update(
            home_id,
            HomePatch {
                state: Some(to),
                lease_expires_at: Some(lease_expires_at),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.storage.transitions().append(HomeTransition {
            home_id: home_id.clone(),
            from_state: home.state,
            to_state: to,
            reason: reason.clone(),
            triggered_by: triggered_by.clone(),
            timestamp: now,
        })?;
        // §4.3 "emits a GREEN audit for normal transitions and YELLOW for
        // FROZEN/ERROR".
        let level = if matches!(to, HomeState::Frozen | HomeState::Error) {
            AuditLevel::Yellow
        } else {
            AuditLevel::Green
        };
        self.audit.record(
            now,
            Some(triggered_by),
            Some(home_id.to_string()),
            "home.transition",
            level,
            serde_json::json!({ "from": format!("{:?}", home.state), "to": format!("{:?}", to), "reason": reason }),
            Some("ok".to_string()),
            None,
        )?;

        self.get(home_id)
    }

    /// Grants a lease: transitions to `Leased` and sets `lease_expires_at`
    /// to `now + clamp(requested_ms)` (§4.3 lease bounds).
    pub fn lease(
        &self,
        home_id: &HomeId,
        requested_ms: Option<i64>,
        triggered_by: impl Into<String>,
        now: i64,
    ) -> Result<Home, HomeError> {
        let home = self.get(home_id)?;
        let triggered_by = triggered_by.into();
        if !home.state.can_transition_to(HomeState::Leased) {
            return Err(HomeError::InvalidTransition {
                home_id: home_id.clone(),
                from: home.state,
                to: HomeState::Leased,
            });
        }
        let duration_ms = self.lease.clamp(requested_ms);
        let expires_at = now + duration_ms;

        self.storage.homes().update(
            home_id,
            HomePatch {
                state: Some(HomeState::Leased),
                lease_expires_at: Some(Some(expires_at)),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.storage.transitions().append(HomeTransition {
            home_id: home_id.clone(),
            from_state: home.state,
            to_state: HomeState::Leased,
            reason: "lease granted".to_string(),
            triggered_by: triggered_by.clone(),
            timestamp: now,
        })?;
        self.audit.record(
            now,
            Some(triggered_by),
            Some(home_id.to_string()),
            "home.lease",
            AuditLevel::Green,
            serde_json::json!({ "duration_ms": duration_ms, "expires_at": expires_at }),
            Some("ok".to_string()),
            None,
        )?;

        self.get(home_id)
    }

    /// Extends `lease_expires_at` without changing `state` (§4.3 `renew`).
    /// Valid only while the home is `Leased` or `Active`; ownership
    /// (caller agentId vs. `home_id`'s agent) is enforced by the tool
    /// surface, not here, since internal callers (e.g. the migration
    /// engine) transition homes without an acting agent.
    pub fn renew(
        &self,
        home_id: &HomeId,
        requested_ms: Option<i64>,
        triggered_by: impl Into<String>,
        now: i64,
    ) -> Result<Home, HomeError> {
        let home = self.get(home_id)?;
        let triggered_by = triggered_by.into();
        if !matches!(home.state, HomeState::Leased | HomeState::Active) {
            return Err(HomeError::NotRenewable { home_id: home_id.clone(), state: home.state });
        }
        let duration_ms = self.lease.clamp(requested_ms);
        let expires_at = now + duration_ms;

        self.storage.homes().update(
            home_id,
            HomePatch {
                lease_expires_at: Some(Some(expires_at)),
                updated_at: now,
                ..Default::default()
            },
        )?;
        self.audit.record(
            now,
            Some(triggered_by),
            Some(home_id.to_string()),
            "home.lease.renew",
            AuditLevel::Green,
            serde_json::json!({ "duration_ms": duration_ms, "expires_at": expires_at }),
            Some("ok".to_string()),
            None,
        )?;

        self.get(home_id)
    }

    /// Releases a lease early, returning the home to `Idle`.
    pub fn release(&self, home_id: &HomeId, triggered_by: impl Into<String>, now: i64) -> Result<Home, HomeError> {
        self.transition(home_id, HomeState::Idle, "lease released", triggered_by, now)
    }

    /// Sweeps every home whose lease has expired back to `Idle`, returning
    /// the ids that were transitioned. Intended to be called once per
    /// scheduler tick (§4.6).
    pub fn sweep_expired_leases(&self, now: i64) -> Result<Vec<HomeId>, HomeError> {
        let mut expired = Vec::new();
        for home in self.storage.homes().list()? {
            if home.state != HomeState::Leased {
                continue;
            }
            let Some(expires_at) = home.lease_expires_at else {
                continue;
            };
            if expires_at > now {
                continue;
            }
            self.transition(&home.home_id, HomeState::Idle, "lease-expired", "scheduler", now)?;
            expired.push(home.home_id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_storage::MemoryStorage;

    fn manager() -> HomeManager {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        HomeManager::new(storage.clone(), AuditLog::new(storage), LeaseConfig::default())
    }

    #[test]
    fn provisions_then_leases_then_releases() {
        let mgr = manager();
        let home_id = HomeId::new("alice", "n1");
        mgr.ensure_home(&home_id, 0).unwrap();
        mgr.transition(&home_id, HomeState::Provisioning, "boot", "sysadmin", 1).unwrap();
        mgr.transition(&home_id, HomeState::Idle, "ready", "sysadmin", 2).unwrap();

        let leased = mgr.lease(&home_id, Some(10_000), "alice", 3).unwrap();
        assert_eq!(leased.state, HomeState::Leased);
        assert_eq!(leased.lease_expires_at, Some(3 + 60_000)); // clamped to min

        let released = mgr.release(&home_id, "alice", 4).unwrap();
        assert_eq!(released.state, HomeState::Idle);
        assert_eq!(released.lease_expires_at, None);
    }

    #[test]
    fn rejects_illegal_transition() {
        let mgr = manager();
        let home_id = HomeId::new("alice", "n1");
        mgr.ensure_home(&home_id, 0).unwrap();
        let err = mgr.transition(&home_id, HomeState::Active, "skip ahead", "alice", 1).unwrap_err();
        assert!(matches!(err, HomeError::InvalidTransition { .. }));
    }

    #[test]
    fn renew_extends_expiry_across_active_transition_without_changing_state() {
        let mgr = manager();
        let home_id = HomeId::new("alice", "n1");
        mgr.ensure_home(&home_id, 0).unwrap();
        mgr.transition(&home_id, HomeState::Provisioning, "boot", "sysadmin", 0).unwrap();
        mgr.transition(&home_id, HomeState::Idle, "ready", "sysadmin", 0).unwrap();
        mgr.lease(&home_id, Some(60_000), "alice", 0).unwrap();

        let renewed = mgr.renew(&home_id, Some(120_000), "alice", 10).unwrap();
        assert_eq!(renewed.state, HomeState::Leased);
        assert_eq!(renewed.lease_expires_at, Some(10 + 120_000));

        let active = mgr.transition(&home_id, HomeState::Active, "work started", "alice", 20).unwrap();
        assert_eq!(active.lease_expires_at, Some(10 + 120_000), "lease clock survives Leased -> Active");

        let renewed_while_active = mgr.renew(&home_id, Some(60_000), "alice", 30).unwrap();
        assert_eq!(renewed_while_active.state, HomeState::Active);
        assert_eq!(renewed_while_active.lease_expires_at, Some(30 + 60_000));
    }

    #[test]
    fn renew_rejects_idle_home() {
        let mgr = manager();
        let home_id = HomeId::new("alice", "n1");
        mgr.ensure_home(&home_id, 0).unwrap();
        mgr.transition(&home_id, HomeState::Provisioning, "boot", "sysadmin", 0).unwrap();
        mgr.transition(&home_id, HomeState::Idle, "ready", "sysadmin", 0).unwrap();

        let err = mgr.renew(&home_id, Some(60_000), "alice", 1).unwrap_err();
        assert!(matches!(err, HomeError::NotRenewable { .. }));
    }

    #[test]
    fn sweep_expires_overdue_leases_only() {
        let mgr = manager();
        let expiring = HomeId::new("alice", "n1");
        let fresh = HomeId::new("bob", "n1");
        for id in [&expiring, &fresh] {
            mgr.ensure_home(id, 0).unwrap();
            mgr.transition(id, HomeState::Provisioning, "boot", "sysadmin", 0).unwrap();
            mgr.transition(id, HomeState::Idle, "ready", "sysadmin", 0).unwrap();
        }
        mgr.lease(&expiring, Some(1_000), "alice", 0).unwrap(); // clamps to 60_000
        mgr.lease(&fresh, Some(1_000_000_000), "bob", 0).unwrap();

        let swept = mgr.sweep_expired_leases(70_000).unwrap();
        assert_eq!(swept, vec![expiring.clone()]);
        assert_eq!(mgr.get(&expiring).unwrap().state, HomeState::Idle);
        assert_eq!(mgr.get(&fresh).unwrap().state, HomeState::Leased);
    }
}
