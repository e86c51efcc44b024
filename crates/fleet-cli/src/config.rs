//! Layered profile/manifest loader (SPEC_FULL §10.3), grounded on the
//! teacher's `server/core/src/config.rs::load` — a `config::Config`
//! builder layering an optional file source under a `FLEET__`-prefixed
//! environment override, rather than a bare `toml::from_str` call, so a
//! node can override `fleet.toml` at deploy time without editing it.

use std::path::PathBuf;

use config::{Config, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fleet config file not found: {0}")]
    Io(String),
    #[error("failed to load fleet config: {0}")]
    Builder(#[from] BuilderError),
}

/// Root document for a node's `fleet.toml`. Every section is optional;
/// absent sections fall back to the defaults recorded in SPEC_FULL
/// §10.3.1.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfigDocument {
    pub data_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub sessions_dir: Option<PathBuf>,
    pub node_id: String,
    pub scheduler: SchedulerSection,
    pub lease: LeaseSection,
    pub storage: StorageSection,
}

impl Default for FleetConfigDocument {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            workspace_root: PathBuf::from("./workspaces"),
            sessions_dir: None,
            node_id: "node-1".to_string(),
            scheduler: SchedulerSection::default(),
            lease: LeaseSection::default(),
            storage: StorageSection::default(),
        }
    }
}

impl FleetConfigDocument {
    /// Loads `path` if it exists, layering a `FLEET__SECTION__KEY`
    /// environment override on top (e.g. `FLEET__LEASE__DEFAULT_MS`), and
    /// falls back to the documented defaults (§10.3.1) if no file is
    /// present at all. Malformed TOML (or an override of the wrong shape)
    /// is a [`ConfigError`] surfaced at startup, not a panic.
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Io(path.display().to_string()));
        }
        let builder = Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .add_source(Environment::with_prefix("FLEET").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn lease_config(&self) -> fleet_home::LeaseConfig {
        fleet_home::LeaseConfig {
            min_ms: self.lease.min_ms,
            max_ms: self.lease.max_ms,
            default_ms: self.lease.default_ms,
        }
    }

    pub fn scheduler_config(&self) -> fleet_scheduler::SchedulerConfig {
        let mut cfg = fleet_scheduler::SchedulerConfig {
            tick_interval_ms: self.scheduler.tick_interval_ms,
            check_interval_ms: (self.scheduler.tick_interval_ms / 2) as u64,
            inter_dispatch_delay_ms: self.scheduler.inter_dispatch_delay_ms,
            stale_lock_age_secs: self.scheduler.stale_lock_age_secs,
            immediate_tick_delay_range_ms: (1_000, 5_000),
            sessions_dir: self.sessions_dir.clone(),
        };
        if cfg.tick_interval_ms <= 0 {
            cfg.tick_interval_ms = 60_000;
            cfg.check_interval_ms = 30_000;
        }
        cfg
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_interval_ms: i64,
    pub inter_dispatch_delay_ms: u64,
    pub stale_lock_age_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60_000,
            inter_dispatch_delay_ms: 3_000,
            stale_lock_age_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseSection {
    pub min_ms: i64,
    pub max_ms: i64,
    pub default_ms: i64,
}

impl Default for LeaseSection {
    fn default() -> Self {
        Self {
            min_ms: 60_000,
            max_ms: 86_400_000,
            default_ms: 3_600_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node_id = \"n1\"").unwrap();
        let doc = FleetConfigDocument::load_from_path(file.path()).unwrap();
        assert_eq!(doc.node_id, "n1");
        assert_eq!(doc.scheduler.tick_interval_ms, 60_000);
        assert_eq!(doc.lease.min_ms, 60_000);
        assert_eq!(doc.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn missing_file_is_a_config_error_not_a_panic() {
        let err = FleetConfigDocument::load_from_path("/nonexistent/fleet.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn environment_override_wins_over_file_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node_id = \"n1\"\n[lease]\ndefault_ms = 3600000").unwrap();
        std::env::set_var("FLEET__LEASE__DEFAULT_MS", "120000");
        let doc = FleetConfigDocument::load_from_path(file.path()).unwrap();
        std::env::remove_var("FLEET__LEASE__DEFAULT_MS");
        assert_eq!(doc.lease.default_ms, 120_000);
    }
}
