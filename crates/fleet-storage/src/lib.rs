//! C1 Storage (§4.1): a durable record store behind one trait object,
//! with an in-memory backend for tests/ephemeral nodes and a sled-backed
//! backend for durable nodes. Grounded on the teacher's `Queue`
//! (`agents/src/implementations/_backup/queue.rs`) for the sled idiom and on
//! `AgentManager`/`MessageBroker` (`core/src/agents/mod.rs`,
//! `core/src/communication/mod.rs`) for the in-memory idiom.

pub mod error;
pub mod memory;
mod order_key;
pub mod patch;
pub mod sled_backend;
pub mod traits;

use std::path::Path;
use std::sync::Arc;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use patch::{AgentLoopPatch, BridgePatch, ChannelPatch, HomePatch, MigrationPatch, TaskPatch};
pub use sled_backend::SledStorage;
pub use traits::{
    AgentLoopStore, AuditStore, BridgeStore, ChannelMessageStore, ChannelStore, DirectoryStore,
    HomeStore, MigrationStore, Storage, TaskStore, TransitionStore,
};

/// Which backend to construct, mirroring the `storage.backend` config key
/// (§10.3: `"memory"` or `"sled"`).
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Memory,
    Sled { data_dir: String },
}

/// Opens the configured backend behind one trait object.
pub fn open(backend: &StorageBackend) -> Result<Arc<dyn Storage>, StorageError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::Sled { data_dir } => {
            Ok(Arc::new(SledStorage::open(Path::new(data_dir))?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_types::{Home, HomeId, HomeState};

    fn exercise_home_roundtrip(storage: &dyn Storage) {
        let home_id = HomeId::new("alice", "n1");
        let home = Home::new(home_id.clone(), 1_000);
        storage.homes().insert(home.clone()).unwrap();

        let fetched = storage.homes().get(&home_id).unwrap().unwrap();
        assert_eq!(fetched.state, HomeState::Unassigned);

        storage
            .homes()
            .update(
                &home_id,
                HomePatch {
                    state: Some(HomeState::Provisioning),
                    updated_at: 2_000,
                    ..Default::default()
                },
            )
            .unwrap();
        let updated = storage.homes().get(&home_id).unwrap().unwrap();
        assert_eq!(updated.state, HomeState::Provisioning);
        assert_eq!(updated.updated_at, 2_000);

        storage.homes().delete(&home_id).unwrap();
        assert!(storage.homes().get(&home_id).unwrap().is_none());
    }

    #[test]
    fn memory_backend_home_roundtrip() {
        exercise_home_roundtrip(&MemoryStorage::new());
    }

    #[test]
    fn sled_backend_home_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        exercise_home_roundtrip(&storage);
    }

    #[test]
    fn update_missing_home_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage
            .homes()
            .update(&HomeId::new("missing", "n1"), HomePatch::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[test]
    fn sled_backend_update_missing_home_is_a_silent_noop() {
        // §4.1 "observed source ambiguity": unlike the in-memory backend
        // (`update_missing_home_is_not_found`), the durable backend silently
        // no-ops instead of failing.
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        storage
            .homes()
            .update(&HomeId::new("missing", "n1"), HomePatch::default())
            .unwrap();
        assert!(storage.homes().get(&HomeId::new("missing", "n1")).unwrap().is_none());
    }

    #[test]
    fn sled_migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        storage.migrate().unwrap();
        storage.migrate().unwrap();
        storage.close().unwrap();
    }

    #[test]
    fn channel_message_seq_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        let channel_id = fleet_types::ChannelId::parse("proj-1").unwrap();
        let first = storage.channel_messages().next_seq(&channel_id).unwrap();
        let second = storage.channel_messages().next_seq(&channel_id).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn audit_query_caps_at_max_page() {
        use fleet_types::{AuditEntry, AuditLevel, MAX_AUDIT_PAGE};

        let storage = MemoryStorage::new();
        for i in 0..(MAX_AUDIT_PAGE + 10) {
            storage
                .audit()
                .append(AuditEntry {
                    id: format!("a{i}"),
                    timestamp: i as i64,
                    agent_id: None,
                    home_id: None,
                    action: "tick".to_string(),
                    level: AuditLevel::Green,
                    detail: serde_json::json!({}),
                    result: None,
                    duration_ms: None,
                })
                .unwrap();
        }
        let page = storage.audit().query(&Default::default()).unwrap();
        assert_eq!(page.len(), MAX_AUDIT_PAGE);
    }
}
