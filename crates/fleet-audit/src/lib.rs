//! C2 Audit log (§4.2): an append-only, queryable record of every
//! consequential action taken by or on behalf of an agent. Every other
//! component crate holds an [`AuditLog`] and calls [`AuditLog::record`] at
//! its own decision points; this crate does not originate entries itself.
//!
//! Grounded on the teacher's `monitoring::Alert`/`AlertLevel`
//! (`core/src/monitoring/mod.rs`) for the severity levels, and on
//! `MessageBroker`'s append-then-query shape
//! (`core/src/communication/mod.rs`) for the log/query split.

use std::sync::Arc;

use fleet_storage::Storage;
use fleet_types::{AuditEntry, AuditFilter, AuditLevel};
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditLog {
    storage: Arc<dyn Storage>,
}

impl AuditLog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Appends one immutable entry, stamping `id` and `timestamp`.
    pub fn record(
        &self,
        now: i64,
        agent_id: Option<String>,
        home_id: Option<String>,
        action: impl Into<String>,
        level: AuditLevel,
        detail: serde_json::Value,
        result: Option<String>,
        duration_ms: Option<u64>,
    ) -> Result<(), fleet_storage::StorageError> {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            agent_id,
            home_id,
            action: action.into(),
            level,
            detail,
            result,
            duration_ms,
        };
        self.storage.audit().append(entry)
    }

    /// Newest-first, capped at [`fleet_types::MAX_AUDIT_PAGE`] regardless of
    /// the filter's requested `limit`.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, fleet_storage::StorageError> {
        self.storage.audit().query(filter)
    }

    pub fn count(&self, filter: &AuditFilter) -> Result<usize, fleet_storage::StorageError> {
        self.storage.audit().count(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_storage::MemoryStorage;

    fn log() -> AuditLog {
        AuditLog::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn records_and_queries_newest_first() {
        let log = log();
        log.record(1_000, Some("alice".into()), None, "home.lease", AuditLevel::Green, serde_json::json!({}), None, None).unwrap();
        log.record(2_000, Some("alice".into()), None, "home.release", AuditLevel::Green, serde_json::json!({}), None, None).unwrap();

        let entries = log.query(&AuditFilter::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "home.release");
        assert_eq!(entries[1].action, "home.lease");
    }

    #[test]
    fn filters_by_agent_and_level() {
        let log = log();
        log.record(1_000, Some("alice".into()), None, "ok", AuditLevel::Green, serde_json::json!({}), None, None).unwrap();
        log.record(1_000, Some("bob".into()), None, "fail", AuditLevel::Red, serde_json::json!({}), None, None).unwrap();

        let filter = AuditFilter {
            agent_id: Some("bob".to_string()),
            ..Default::default()
        };
        let entries = log.query(&filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, AuditLevel::Red);
    }
}
