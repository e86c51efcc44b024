//! Scheduler tunables, matching the defaults recorded in SPEC_FULL §10.3.1.

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base period an AWAKE agent is ticked at (§4.6 step 2). Default 60s.
    pub tick_interval_ms: i64,
    /// How often the cooperative timer wakes to check for due agents
    /// (§4.6: "every `TICK_INTERVAL_MS/2`").
    pub check_interval_ms: u64,
    /// Pause between sequential dispatches within one cycle (§4.6 step 5).
    pub inter_dispatch_delay_ms: u64,
    /// Session lock files older than this are pruned by the stale-lock
    /// cleanup pass (§4.6 step 4).
    pub stale_lock_age_secs: u64,
    /// Burst-absorption window applied before an immediate-tick dispatch
    /// actually sends (§4.6 "a jittered delay of 1-5s").
    pub immediate_tick_delay_range_ms: (u64, u64),
    /// Optional filesystem directory of per-session `<session>.lock` files
    /// the scheduler prunes (§6 "Persisted state layout").
    pub sessions_dir: Option<std::path::PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let tick_interval_ms = 60_000;
        Self {
            tick_interval_ms,
            check_interval_ms: (tick_interval_ms / 2) as u64,
            inter_dispatch_delay_ms: 3_000,
            stale_lock_age_secs: 60,
            immediate_tick_delay_range_ms: (1_000, 5_000),
            sessions_dir: None,
        }
    }
}
