//! Authorization policy for the `REQUESTED → AUTHORIZED` gate (§4.7).

use std::collections::HashSet;

use fleet_types::MigrationReason;

#[derive(Debug, Clone)]
pub struct MigrationPolicy {
    pub allowed_reasons: HashSet<MigrationReason>,
}

impl Default for MigrationPolicy {
    fn default() -> Self {
        use MigrationReason::*;
        Self {
            allowed_reasons: HashSet::from([
                AgentRequest,
                OrchestratorRebalance,
                NodeRetiring,
                LeaseMigration,
                SecurityRelocation,
                ResourceNeed,
            ]),
        }
    }
}

impl MigrationPolicy {
    pub fn allows(&self, reason: MigrationReason) -> bool {
        self.allowed_reasons.contains(&reason)
    }
}
