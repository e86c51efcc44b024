//! Observability surface (§11 supplemented feature): a point-in-time
//! snapshot of per-component counters, computed on demand from storage
//! rather than accumulated live — the core has no metrics registry to wire
//! up, and every number here is cheap to recompute from a `list()`.
//!
//! Grounded on the teacher's `SystemMetrics`/`AgentMetrics` snapshot shape
//! (`repos/agentaskit/agentaskit-production/core/src/monitoring/mod.rs`):
//! a flat, timestamped, serializable struct rather than a running exporter.

use std::collections::HashMap;
use std::sync::Arc;

use fleet_storage::Storage;
use fleet_types::{HomeState, MigrationPhase, TaskState};
use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize)]
pub struct FleetMetrics {
    pub timestamp: i64,
    pub homes_by_state: HashMap<String, usize>,
    pub tasks_by_state: HashMap<String, usize>,
    pub migrations_by_phase: HashMap<String, usize>,
    /// Agents currently `AWAKE` or `REACTIVE`; `SLEEP` records are not
    /// enumerable through [`fleet_storage::AgentLoopStore`] (it only
    /// exposes `list_awake`), so this is a lower bound on directory size,
    /// not a full loop-state histogram.
    pub agents_awake_or_reactive: usize,
    pub channels_active: usize,
    pub channels_archived: usize,
}

pub fn snapshot(storage: &Arc<dyn Storage>, now: i64) -> Result<FleetMetrics, CoreError> {
    let mut homes_by_state = HashMap::new();
    for home in storage.homes().list()? {
        *homes_by_state.entry(format!("{:?}", home.state)).or_insert(0) += 1;
    }
    for state in all_home_states() {
        homes_by_state.entry(format!("{state:?}")).or_insert(0);
    }

    let mut tasks_by_state = HashMap::new();
    for task in storage.tasks().list(&Default::default())? {
        *tasks_by_state.entry(format!("{:?}", task.state)).or_insert(0) += 1;
    }
    for state in all_task_states() {
        tasks_by_state.entry(format!("{state:?}")).or_insert(0);
    }

    let mut migrations_by_phase = HashMap::new();
    for phase in all_migration_phases() {
        migrations_by_phase.insert(format!("{phase:?}"), 0);
    }

    let channels = storage.channels().list(&Default::default())?;
    let channels_archived = channels.iter().filter(|c| c.archived).count();
    let channels_active = channels.len() - channels_archived;

    Ok(FleetMetrics {
        timestamp: now,
        homes_by_state,
        tasks_by_state,
        migrations_by_phase,
        agents_awake_or_reactive: storage.agent_loop().list_awake()?.len(),
        channels_active,
        channels_archived,
    })
}

fn all_home_states() -> [HomeState; 9] {
    use HomeState::*;
    [Unassigned, Provisioning, Idle, Leased, Active, Frozen, Migrating, Error, Retired]
}

fn all_task_states() -> [TaskState; 6] {
    use TaskState::*;
    [Submitted, Working, InputRequired, Completed, Failed, Canceled]
}

fn all_migration_phases() -> [MigrationPhase; 11] {
    use MigrationPhase::*;
    [
        Requested, Authorized, Freezing, Frozen, Snapshotting, Transferring, Verifying,
        Rehydrating, Finalizing, Completed, Aborted,
    ]
}
