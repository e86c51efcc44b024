//! Bootstrap binary for the fleet orchestration core (SPEC_FULL §11
//! "Bootstrap binary"). Per §1 this is an external collaborator's
//! concern — it wires the component crates together from a config file
//! and exposes a thin `clap` subcommand surface for local/manual exercise.
//! Grounded on the teacher's `apps/cli/src/main.rs` (`clap::{Parser,
//! Subcommand}`, `anyhow::Result` + `.context(...)`, JSON-by-default
//! output).

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_a2a::{A2aClient, RecordingA2aClient};
use fleet_audit::AuditLog;
use fleet_channels::{ChannelManager, NullBridgeNotifier};
use fleet_core::FleetCore;
use fleet_home::HomeManager;
use fleet_migration::MigrationManager;
use fleet_scheduler::Scheduler;
use fleet_storage::{self, StorageBackend};
use fleet_tasks::TaskManager;
use fleet_types::{now_ms, Role};
use tracing::info;

use config::{FleetConfigDocument, StorageBackend as ConfigStorageBackend};

#[derive(Parser)]
#[command(
    name = "fleet-cli",
    about = "Fleet orchestration core: local bootstrap and manual exercise",
    version
)]
struct Cli {
    /// Path to the node's `fleet.toml`. Missing optional sections fall back
    /// to the defaults in SPEC_FULL §10.3.1.
    #[arg(long, default_value = "fleet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read-only home listing, optionally narrowed by agentId/nodeId.
    Status {
        #[arg(long)]
        agent_id: Option<String>,
        #[arg(long)]
        node_id: Option<String>,
    },
    /// Provision a home for `agentId@nodeId` and carry it through to IDLE.
    Provision {
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        node_id: String,
    },
    /// Run a single scheduler tick cycle immediately (rather than waiting
    /// for the cooperative timer) and report which agents were dispatched.
    Tick,
    /// Initiate a migration for an agent to a target node.
    Migrate {
        #[arg(long)]
        target_agent_id: String,
        #[arg(long)]
        target_node_id: String,
        #[arg(long, default_value = "orchestrator_rebalance")]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let doc = match FleetConfigDocument::load_from_path(&cli.config) {
        Ok(doc) => doc,
        Err(config::ConfigError::Io(_)) => {
            info!(path = %cli.config.display(), "no fleet.toml found, using defaults");
            FleetConfigDocument::default()
        }
        Err(err) => return Err(err).context("failed to load fleet.toml"),
    };

    let backend = match doc.storage.backend {
        ConfigStorageBackend::Memory => StorageBackend::Memory,
        ConfigStorageBackend::Sled => StorageBackend::Sled {
            data_dir: doc.data_dir.to_string_lossy().into_owned(),
        },
    };
    let storage = fleet_storage::open(&backend).context("failed to open storage backend")?;
    storage.migrate().context("failed to run storage schema bootstrap")?;

    let audit = AuditLog::new(storage.clone());
    let a2a: Arc<dyn A2aClient> = Arc::new(RecordingA2aClient::new());
    let home = HomeManager::new(storage.clone(), audit.clone(), doc.lease_config());
    let tasks = TaskManager::new(storage.clone(), audit.clone(), a2a.clone());
    let scheduler = Arc::new(Scheduler::new(storage.clone(), audit.clone(), a2a, home.clone(), doc.scheduler_config()));
    let channels = ChannelManager::new(storage.clone(), audit.clone(), scheduler.clone(), Arc::new(NullBridgeNotifier));
    let migration = MigrationManager::new(storage.clone(), audit.clone(), home.clone(), Default::default());
    let core = FleetCore::new(storage.clone(), audit, home, tasks, channels, scheduler.clone(), migration);

    let result = run_command(&core, cli.command).await;

    storage.close().context("failed to close storage backend")?;
    result
}

async fn run_command(core: &FleetCore, command: Command) -> Result<()> {
    match command {
        Command::Status { agent_id, node_id } => {
            let outcome = core.status(serde_json::json!({ "agentId": agent_id, "nodeId": node_id }));
            print_outcome(&outcome)
        }
        Command::Provision { agent_id, node_id } => {
            let outcome = core.provision("sysadmin", serde_json::json!({ "agentId": agent_id, "nodeId": node_id }));
            print_outcome(&outcome)
        }
        Command::Tick => {
            core.scheduler().run_cycle_if_idle(now_ms()).await;
            println!("{}", serde_json::json!({ "ok": true, "output": "tick cycle ran" }));
            Ok(())
        }
        Command::Migrate { target_agent_id, target_node_id, reason } => {
            // Passed through as a JSON string; the tool boundary validates
            // it against `MigrationReason` and surfaces a typed
            // `Validation` error through `ToolOutcome` on a bad value.
            let outcome = core.migrate(
                Role::Orchestrator,
                serde_json::json!({
                    "targetAgentId": target_agent_id,
                    "targetNodeId": target_node_id,
                    "reason": reason,
                }),
            );
            print_outcome(&outcome)
        }
    }
}

fn print_outcome<T: serde::Serialize>(outcome: &fleet_core::ToolOutcome<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
