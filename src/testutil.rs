//! Shared test helpers for in-crate tests.

use std::sync::Arc;

use crate::config::{Config, DriveConfig, NodeConfig, StorageConfig};
use crate::drive::{DbActivityRecorder, Drive};
use crate::object_store::{LocalStore, ObjectStore};
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with(temp_dir, DriveConfig::default())
}

/// Same as [`test_state`] with custom drive limits.
pub fn test_state_with(temp_dir: &tempfile::TempDir, drive_config: DriveConfig) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        drive: drive_config,
        node: NodeConfig {
            id: uuid::Uuid::new_v4().to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig::default(),
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        max_batch_size: 50 * 1024 * 1024,
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store: Arc<dyn ObjectStore> =
        Arc::new(LocalStore::new(&files_dir).expect("Failed to create test object store"));
    let drive = Drive::new(
        db.clone(),
        Arc::clone(&object_store),
        Arc::new(DbActivityRecorder::new(db.clone())),
        config.drive.clone(),
    );

    Arc::new(AppState {
        config,
        db,
        drive,
        object_store,
    })
}
