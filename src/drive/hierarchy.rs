use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{Drive, DriveError};
use crate::object_store::ObjectStoreError;
use crate::storage::models::{ActivityEvent, ActivityKind, Node};
use crate::storage::FolderInsert;

impl Drive {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a node the user owns or has been shared.
    pub fn get(&self, user_id: &str, node_id: &str) -> Result<Node, DriveError> {
        self.accessible_node(user_id, node_id)
    }

    /// Live children of a folder (`None` = root).
    pub fn list_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Node>, DriveError> {
        if let Some(parent_id) = parent_id {
            let parent = self.owned_node(owner_id, parent_id)?;
            if !parent.is_folder {
                return Err(DriveError::Validation(format!(
                    "{parent_id} is not a folder"
                )));
            }
        }
        Ok(self.db.find_by_parent(owner_id, parent_id)?)
    }

    pub fn list_trash(&self, owner_id: &str) -> Result<Vec<Node>, DriveError> {
        Ok(self.db.find_trashed(owner_id)?)
    }

    /// Walk `parent_folder` links upward from `folder_id` (inclusive) and
    /// report whether `ancestor_id` is reached before the root.
    ///
    /// The walk is bounded by `max_tree_depth`; a longer chain can only come
    /// from a cycle, which is reported as an integrity violation.
    pub fn check_if_subfolder(&self, folder_id: &str, ancestor_id: &str) -> Result<bool, DriveError> {
        let mut current = Some(folder_id.to_string());
        let mut steps = 0usize;

        while let Some(id) = current {
            if id == ancestor_id {
                return Ok(true);
            }
            if steps >= self.config.max_tree_depth {
                return Err(DriveError::Integrity(format!(
                    "parent chain of {folder_id} exceeds {} levels",
                    self.config.max_tree_depth
                )));
            }
            steps += 1;
            current = match self.db.get_node(&id)? {
                Some(node) => node.parent_folder,
                None => {
                    if id != folder_id {
                        warn!(node_id = %id, "Parent chain references a missing folder");
                    }
                    None
                }
            };
        }

        Ok(false)
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub async fn create_folder(
        &self,
        owner_id: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Node, DriveError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DriveError::Validation(
                "Folder name cannot be empty".to_string(),
            ));
        }
        self.resolve_parent(owner_id, parent_id)?;

        let folder = Node::new_folder(owner_id, name, parent_id);
        if let FolderInsert::Conflict(existing) = self.db.insert_folder_unique(&folder)? {
            return Err(DriveError::Conflict(format!(
                "A folder named '{}' already exists here",
                existing.name
            )));
        }

        info!(owner_id = %owner_id, node_id = %folder.id, name = %folder.name, "Folder created");
        self.record(ActivityEvent::for_node(ActivityKind::CreateFolder, owner_id, &folder))
            .await;
        self.refresh_quota(owner_id);
        Ok(folder)
    }

    /// Rename a node. Sibling folder names are not re-checked.
    pub async fn rename(
        &self,
        owner_id: &str,
        node_id: &str,
        new_name: &str,
    ) -> Result<Node, DriveError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(DriveError::Validation("Name cannot be empty".to_string()));
        }
        let node = self.owned_node(owner_id, node_id)?;

        let updated = self
            .db
            .update_node(node_id, |n| n.name = new_name.to_string())?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        debug!(node_id = %node_id, from = %node.name, to = %updated.name, "Renamed node");
        self.record(
            ActivityEvent::for_node(ActivityKind::Rename, owner_id, &updated)
                .with_details(format!("renamed from '{}'", node.name)),
        )
        .await;
        Ok(updated)
    }

    pub async fn move_node(
        &self,
        owner_id: &str,
        node_id: &str,
        target_id: Option<&str>,
    ) -> Result<Node, DriveError> {
        if target_id == Some(node_id) {
            return Err(DriveError::SelfMove);
        }
        let node = self.owned_node(owner_id, node_id)?;
        self.resolve_target_folder(owner_id, target_id)?;

        if node.is_folder {
            if let Some(target_id) = target_id {
                if self.check_if_subfolder(target_id, node_id)? {
                    return Err(DriveError::Cycle);
                }
            }
            if let Some(existing) = self.db.find_folder_by_name(owner_id, target_id, &node.name)? {
                if existing.id != node.id {
                    return Err(DriveError::Conflict(format!(
                        "A folder named '{}' already exists in the destination",
                        node.name
                    )));
                }
            }
        }

        let updated = self
            .db
            .update_node(node_id, |n| n.parent_folder = target_id.map(|s| s.to_string()))?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        debug!(node_id = %node_id, target = ?target_id, "Moved node");
        self.record(
            ActivityEvent::for_node(ActivityKind::Move, owner_id, &updated)
                .with_details(format!("moved to {}", target_id.unwrap_or("root"))),
        )
        .await;
        Ok(updated)
    }

    /// Copy a node into `target_id`. The copy shares the source's content key:
    /// no bytes are duplicated, and permanent deletion keeps the object while
    /// any node still references it. Folders are copied without their contents.
    pub async fn copy(
        &self,
        owner_id: &str,
        node_id: &str,
        target_id: Option<&str>,
    ) -> Result<Node, DriveError> {
        let source = self.owned_node(owner_id, node_id)?;
        self.resolve_target_folder(owner_id, target_id)?;
        if !source.is_folder {
            self.ensure_capacity(owner_id, source.size)?;
        }

        let now = Utc::now();
        let copy = Node {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("{} (Copy)", source.name),
            parent_folder: target_id.map(|s| s.to_string()),
            in_trash: false,
            deleted_at: None,
            permanent_delete_at: None,
            is_public: false,
            public_url: None,
            shared_with: Vec::new(),
            created_at: now,
            updated_at: now,
            ..source.clone()
        };

        if copy.is_folder {
            if let FolderInsert::Conflict(existing) = self.db.insert_folder_unique(&copy)? {
                return Err(DriveError::Conflict(format!(
                    "A folder named '{}' already exists in the destination",
                    existing.name
                )));
            }
        } else {
            self.db.put_node(&copy)?;
        }

        debug!(source_id = %node_id, node_id = %copy.id, "Copied node");
        self.record(
            ActivityEvent::for_node(ActivityKind::Copy, owner_id, &copy)
                .with_details(format!("copied from {node_id}")),
        )
        .await;
        self.refresh_quota(owner_id);
        Ok(copy)
    }

    // ========================================================================
    // Trash lifecycle
    // ========================================================================

    /// Move a node to the trash. Children of a trashed folder are left as
    /// they are: they stay live under a trashed parent.
    pub async fn trash(&self, owner_id: &str, node_id: &str) -> Result<Node, DriveError> {
        let node = self.owned_node(owner_id, node_id)?;
        if node.in_trash {
            return Err(DriveError::Validation("Item is already in the trash".to_string()));
        }

        let now = Utc::now();
        let purge_at = now + Duration::days(i64::from(self.config.trash_retention_days));
        let updated = self
            .db
            .update_node(node_id, |n| {
                n.in_trash = true;
                n.deleted_at = Some(now);
                n.permanent_delete_at = Some(purge_at);
            })?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        info!(node_id = %node_id, purge_at = %purge_at, "Moved node to trash");
        self.record(ActivityEvent::for_node(ActivityKind::Trash, owner_id, &updated))
            .await;
        self.refresh_quota(owner_id);
        Ok(updated)
    }

    /// Take a node out of the trash. A node whose former parent has since been
    /// deleted comes back at the root.
    pub async fn restore(&self, owner_id: &str, node_id: &str) -> Result<Node, DriveError> {
        let node = self.owned_node(owner_id, node_id)?;
        if !node.in_trash {
            return Err(DriveError::Validation("Item is not in the trash".to_string()));
        }

        let parent_gone = match node.parent_folder.as_deref() {
            Some(parent_id) => self.db.get_node(parent_id)?.is_none(),
            None => false,
        };
        let parent = if parent_gone {
            None
        } else {
            node.parent_folder.as_deref()
        };

        if node.is_folder {
            if let Some(existing) = self.db.find_folder_by_name(owner_id, parent, &node.name)? {
                if existing.id != node.id {
                    return Err(DriveError::Conflict(format!(
                        "A folder named '{}' already exists at the restore location",
                        node.name
                    )));
                }
            }
        }

        let updated = self
            .db
            .update_node(node_id, |n| {
                n.in_trash = false;
                n.deleted_at = None;
                n.permanent_delete_at = None;
                if parent_gone {
                    n.parent_folder = None;
                }
            })?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;

        if parent_gone {
            warn!(node_id = %node_id, "Former parent no longer exists; restored to root");
        }
        info!(node_id = %node_id, "Restored node from trash");
        self.record(ActivityEvent::for_node(ActivityKind::Restore, owner_id, &updated))
            .await;
        self.refresh_quota(owner_id);
        Ok(updated)
    }

    /// Remove a node and its stored content for good.
    pub async fn permanent_delete(&self, owner_id: &str, node_id: &str) -> Result<(), DriveError> {
        let node = self.owned_node(owner_id, node_id)?;
        self.destroy(&node).await?;

        info!(node_id = %node_id, "Permanently deleted node");
        self.record(ActivityEvent::for_node(ActivityKind::Delete, owner_id, &node))
            .await;
        self.refresh_quota(owner_id);
        Ok(())
    }

    /// Permanently delete every trashed node of an account. A node that cannot
    /// be deleted stays in the trash while the rest are removed; the first
    /// such failure is returned after the activity and quota are updated.
    pub async fn empty_trash(&self, owner_id: &str) -> Result<u64, DriveError> {
        let trashed = self.db.find_trashed(owner_id)?;
        let mut deleted = 0u64;
        let mut first_error = None;
        for node in &trashed {
            match self.destroy(node).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Failed to delete trashed item");
                    first_error.get_or_insert(e);
                }
            }
        }

        let failed = trashed.len() as u64 - deleted;
        info!(owner_id = %owner_id, deleted, failed, "Emptied trash");
        let details = if failed > 0 {
            format!("{deleted} item(s) deleted, {failed} failed")
        } else {
            format!("{deleted} item(s) deleted")
        };
        self.record(ActivityEvent::new(ActivityKind::EmptyTrash, owner_id).with_details(details))
            .await;
        self.refresh_quota(owner_id);

        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// Permanently delete trashed nodes of every account whose retention
    /// window ended at or before `now`. Per-node failures are logged and
    /// skipped so one bad object cannot stall the sweep.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DriveError> {
        let expired = self.db.find_expired_trash(now)?;
        let mut owners = BTreeSet::new();
        let mut deleted = 0u64;

        for node in &expired {
            match self.destroy(node).await {
                Ok(()) => {
                    deleted += 1;
                    owners.insert(node.owner_id.clone());
                    self.record(
                        ActivityEvent::for_node(ActivityKind::Delete, &node.owner_id, node)
                            .with_details("trash retention expired"),
                    )
                    .await;
                }
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Failed to purge expired trash item");
                }
            }
        }

        for owner_id in &owners {
            self.refresh_quota(owner_id);
        }
        if deleted > 0 {
            info!(deleted, accounts = owners.len(), "Purged expired trash");
        }
        Ok(deleted)
    }

    /// Delete the content object (unless a copy still references it), then the
    /// record. Children of a deleted folder are moved to the root, where a
    /// clashing folder name gets a `" (n)"` suffix.
    async fn destroy(&self, node: &Node) -> Result<(), DriveError> {
        if let Some(ref path) = node.path {
            if self.db.count_path_references(path)? <= 1 {
                match self.store.delete(path).await {
                    Ok(()) | Err(ObjectStoreError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                debug!(node_id = %node.id, path = %path, "Content still referenced; keeping object");
            }
        }

        self.db.delete_node(&node.id)?;

        if node.is_folder {
            let orphans = self.db.reparent_children(&node.owner_id, &node.id, None)?;
            if orphans > 0 {
                warn!(
                    node_id = %node.id,
                    orphans,
                    "Deleted folder still had children; moved them to root"
                );
            }
        }
        Ok(())
    }
}
