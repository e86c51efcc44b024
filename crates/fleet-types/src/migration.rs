//! Migration ticket shape for the thirteen-phase handover engine (§3, §4.7).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub node_id: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationPhase {
    Requested,
    Authorized,
    Freezing,
    Frozen,
    Snapshotting,
    Transferring,
    Verifying,
    Rehydrating,
    Finalizing,
    Completed,
    Aborted,
}

impl MigrationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationPhase::Completed | MigrationPhase::Aborted)
    }

    /// Linear happy-path successor; `None` has no automatic next phase
    /// (either terminal, or advanced by a side-channel call such as
    /// `handleVerification` or `rollback`).
    pub fn next_linear(self) -> Option<MigrationPhase> {
        use MigrationPhase::*;
        match self {
            Requested => Some(Authorized),
            Authorized => Some(Freezing),
            Freezing => Some(Frozen),
            Frozen => Some(Snapshotting),
            Snapshotting => Some(Transferring),
            Transferring => Some(Verifying),
            Verifying => None, // only via handle_verification
            Rehydrating => Some(Finalizing),
            Finalizing => Some(Completed),
            Completed | Aborted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipHolder {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationReason {
    AgentRequest,
    OrchestratorRebalance,
    NodeRetiring,
    LeaseMigration,
    SecurityRelocation,
    ResourceNeed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTicket {
    pub migration_id: String,
    pub agent_id: String,
    pub source: NodeEndpoint,
    pub target: NodeEndpoint,
    pub phase: MigrationPhase,
    pub ownership_holder: OwnershipHolder,
    pub reason: MigrationReason,
    pub created_at: i64,
    pub updated_at: i64,
    pub checksum: Option<String>,
    pub verification_result: Option<bool>,
    pub abort_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_matches_phase_invariant() {
        // Invariant 4 in spec.md §8: ownership_holder is Target iff phase is
        // one of the three post-handoff phases.
        for phase in [
            MigrationPhase::Requested,
            MigrationPhase::Authorized,
            MigrationPhase::Freezing,
            MigrationPhase::Frozen,
            MigrationPhase::Snapshotting,
            MigrationPhase::Transferring,
            MigrationPhase::Verifying,
        ] {
            assert!(!matches!(
                expected_holder(phase),
                OwnershipHolder::Target
            ));
        }
        for phase in [
            MigrationPhase::Rehydrating,
            MigrationPhase::Finalizing,
            MigrationPhase::Completed,
        ] {
            assert!(matches!(expected_holder(phase), OwnershipHolder::Target));
        }
    }

    fn expected_holder(phase: MigrationPhase) -> OwnershipHolder {
        match phase {
            MigrationPhase::Rehydrating | MigrationPhase::Finalizing | MigrationPhase::Completed => {
                OwnershipHolder::Target
            }
            _ => OwnershipHolder::Source,
        }
    }
}
