//! drive-store - A personal cloud-storage backend
//!
//! This crate provides hierarchical file and folder storage for user accounts with:
//! - Folder-tree invariants (no cycles, unique folder names per directory)
//! - Upload-time quota enforcement and duplicate detection
//! - Trash with a retention window and scheduled permanent deletion
//! - Direct and public-link sharing
//! - Self-healing content paths when stored objects move
//! - Swappable object storage backends (local filesystem, GCS)
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)

pub mod api;
pub mod config;
pub mod drive;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use drive::Drive;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub drive: Drive,
    pub object_store: Arc<dyn object_store::ObjectStore>,
}
