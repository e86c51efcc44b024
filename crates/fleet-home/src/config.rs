//! Lease bounds, grounded on the defaults recorded in SPEC_FULL §10.3.

#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    pub min_ms: i64,
    pub max_ms: i64,
    pub default_ms: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            min_ms: 60_000,
            max_ms: 86_400_000,
            default_ms: 3_600_000,
        }
    }
}

impl LeaseConfig {
    /// Clamps a requested lease duration to `[min_ms, max_ms]`; `None`
    /// requests the configured default.
    pub fn clamp(&self, requested_ms: Option<i64>) -> i64 {
        requested_ms
            .unwrap_or(self.default_ms)
            .clamp(self.min_ms, self.max_ms)
    }
}
