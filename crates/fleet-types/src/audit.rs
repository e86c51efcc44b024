//! Audit entry shape (§3, §4.2). Entries are immutable once appended.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditLevel {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: i64,
    pub agent_id: Option<String>,
    pub home_id: Option<String>,
    pub action: String,
    pub level: AuditLevel,
    pub detail: serde_json::Value,
    pub result: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub agent_id: Option<String>,
    pub home_id: Option<String>,
    pub level: Option<AuditLevel>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

/// Audit query results are capped at 100 regardless of the requested limit.
pub const MAX_AUDIT_PAGE: usize = 100;
