use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub drive: DriveConfig,
    pub node: NodeConfig,
    pub storage: StorageConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes, per file
    pub max_upload_size: u64,
    /// Maximum request body size in bytes for a folder (batch) upload
    pub max_batch_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
    pub id: String,
}

/// Limits and retention rules of the storage subsystem.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Storage ceiling per account in bytes
    pub quota_bytes: u64,
    /// Days a trashed node is kept before permanent deletion
    pub trash_retention_days: u32,
    /// How often the trash sweeper runs (seconds)
    pub trash_sweep_interval_seconds: u64,
    /// Upper bound on parent-chain walks; exceeding it means the tree is corrupt
    pub max_tree_depth: usize,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to ADC)
    pub gcs_credentials_file: Option<String>,
}

/// 15 GiB
pub const DEFAULT_QUOTA_BYTES: u64 = 16_106_127_360;
pub const DEFAULT_TRASH_RETENTION_DAYS: u32 = 30;

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            quota_bytes: DEFAULT_QUOTA_BYTES,
            trash_retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            trash_sweep_interval_seconds: 3600,
            max_tree_depth: 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            gcs_bucket: None,
            gcs_credentials_file: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = env_parse("MAX_UPLOAD_SIZE", 50 * 1024 * 1024); // 50MB
        let max_batch_size = env_parse("MAX_BATCH_SIZE", 512 * 1024 * 1024); // 512MB

        let defaults = DriveConfig::default();
        let drive = DriveConfig {
            quota_bytes: env_parse("QUOTA_BYTES", defaults.quota_bytes),
            trash_retention_days: env_parse("TRASH_RETENTION_DAYS", defaults.trash_retention_days),
            trash_sweep_interval_seconds: env_parse(
                "TRASH_SWEEP_INTERVAL",
                defaults.trash_sweep_interval_seconds,
            ),
            max_tree_depth: env_parse("MAX_TREE_DEPTH", defaults.max_tree_depth),
        };

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let gcs_bucket = std::env::var("GCS_BUCKET").ok();
        let gcs_credentials_file = std::env::var("GCS_CREDENTIALS_FILE").ok();

        let config = Config {
            drive,
            node: NodeConfig {
                id: node_id,
                bind_address,
                data_dir,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                gcs_bucket,
                gcs_credentials_file,
            },
            test_mode,
            max_upload_size,
            max_batch_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "NODE_ID cannot be empty".to_string(),
            ));
        }

        if matches!(self.storage.backend, StorageBackend::Gcs) && self.storage.gcs_bucket.is_none()
        {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if self.drive.trash_retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "TRASH_RETENTION_DAYS must be at least 1".to_string(),
            ));
        }

        if self.drive.max_tree_depth == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_TREE_DEPTH must be at least 1".to_string(),
            ));
        }

        if self.drive.trash_sweep_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "TRASH_SWEEP_INTERVAL must be at least 1".to_string(),
            ));
        }

        if self.max_batch_size < self.max_upload_size {
            return Err(ConfigError::ValidationError(
                "MAX_BATCH_SIZE cannot be smaller than MAX_UPLOAD_SIZE".to_string(),
            ));
        }

        if self.max_upload_size > self.drive.quota_bytes {
            tracing::warn!(
                "MAX_UPLOAD_SIZE ({}) exceeds QUOTA_BYTES ({}); uploads above the quota will be rejected.",
                self.max_upload_size,
                self.drive.quota_bytes
            );
        }

        Ok(())
    }
}
