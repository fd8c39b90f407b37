//! The storage subsystem: folder hierarchy, uploads, trash, sharing, quota
//! accounting and content-path reconciliation, built on the node repository
//! in [`crate::storage`] and an [`ObjectStore`] for the bytes.
//!
//! Each operation is a sequence of independent steps (node mutation, quota
//! recomputation, activity record). The quota is always recomputed from the
//! node set, so a failure between steps cannot leave counters drifting.

mod activity;
mod hierarchy;
mod quota;
mod reconcile;
mod share;
mod upload;

pub use activity::{ActivityError, ActivityRecorder, DbActivityRecorder, RecentFeed};
pub use quota::compute_usage;
pub use reconcile::{find_exact_match, find_name_match, match_stems, Download};
pub use upload::{BatchFailure, BatchItem, BatchReport, UploadOutcome, UploadRequest};

use std::sync::Arc;

use thiserror::Error;

use crate::config::DriveConfig;
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::storage::models::{ActivityEvent, Node};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Storage quota exceeded: {used} bytes used, {incoming} requested, limit {limit}")]
    QuotaExceeded { used: u64, incoming: u64, limit: u64 },
    #[error("Invalid parent folder: {0}")]
    InvalidParent(String),
    #[error("A folder cannot be moved into itself")]
    SelfMove,
    #[error("A folder cannot be moved into one of its own subfolders")]
    Cycle,
    #[error("File content is missing for node {0}")]
    ContentMissing(String),
    #[error("Integrity violation: {0}")]
    Integrity(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
}

/// Entry point for every storage operation. Cheap to clone.
#[derive(Clone)]
pub struct Drive {
    db: Database,
    store: Arc<dyn ObjectStore>,
    activity: Arc<dyn ActivityRecorder>,
    config: DriveConfig,
}

impl Drive {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        activity: Arc<dyn ActivityRecorder>,
        config: DriveConfig,
    ) -> Self {
        Self {
            db,
            store,
            activity,
            config,
        }
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// A node owned by `owner_id`. Nodes of other accounts are reported as
    /// missing rather than forbidden.
    fn owned_node(&self, owner_id: &str, node_id: &str) -> Result<Node, DriveError> {
        self.db
            .get_node(node_id)?
            .filter(|n| n.owner_id == owner_id)
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))
    }

    /// A node the user owns or has been shared.
    fn accessible_node(&self, user_id: &str, node_id: &str) -> Result<Node, DriveError> {
        self.db
            .get_node(node_id)?
            .filter(|n| n.is_accessible_by(user_id))
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))
    }

    /// Validate a parent reference for a node being created: it must be a
    /// live folder owned by `owner_id`.
    fn resolve_parent(&self, owner_id: &str, parent_id: Option<&str>) -> Result<(), DriveError> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        match self.db.get_node(parent_id)? {
            Some(parent) if parent.owner_id != owner_id => Err(DriveError::InvalidParent(
                format!("folder {parent_id} does not exist"),
            )),
            Some(parent) if !parent.is_folder => Err(DriveError::InvalidParent(format!(
                "{parent_id} is not a folder"
            ))),
            Some(parent) if parent.in_trash => Err(DriveError::InvalidParent(format!(
                "folder {parent_id} is in the trash"
            ))),
            Some(_) => Ok(()),
            None => Err(DriveError::InvalidParent(format!(
                "folder {parent_id} does not exist"
            ))),
        }
    }

    /// Validate the destination of a move or copy.
    fn resolve_target_folder(
        &self,
        owner_id: &str,
        target_id: Option<&str>,
    ) -> Result<Option<Node>, DriveError> {
        let Some(target_id) = target_id else {
            return Ok(None);
        };
        let target = self
            .db
            .get_node(target_id)?
            .filter(|n| n.owner_id == owner_id)
            .ok_or_else(|| DriveError::NotFound("Target folder".to_string()))?;
        if !target.is_folder {
            return Err(DriveError::InvalidParent(format!(
                "{target_id} is not a folder"
            )));
        }
        if target.in_trash {
            return Err(DriveError::InvalidParent(format!(
                "folder {target_id} is in the trash"
            )));
        }
        Ok(Some(target))
    }

    /// Hand an event to the activity recorder. Failures are logged only.
    async fn record(&self, event: ActivityEvent) {
        if let Err(e) = self.activity.record(&event).await {
            tracing::warn!(
                kind = ?event.kind,
                user_id = %event.user_id,
                error = %e,
                "Failed to record activity"
            );
        }
    }

    /// Best-effort removal of bytes written by a failed or redundant upload.
    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to clean up stored object");
        }
    }
}

/// Content-store area of an account: the account id restricted to characters
/// that are safe as a single key segment.
pub fn storage_area(owner_id: &str) -> String {
    owner_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_area_sanitizes_separators() {
        assert_eq!(storage_area("user-42"), "user-42");
        assert_eq!(storage_area("../etc"), "___etc");
        assert_eq!(storage_area("a/b c"), "a_b_c");
    }
}
