use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{storage_area, Drive, DriveError};
use crate::storage::models::{ActivityEvent, ActivityKind, Node};
use crate::storage::FileInsert;

const FALLBACK_MIME: &str = "application/octet-stream";
const MAX_KEY_NAME_LEN: usize = 100;

/// A single file to place in an account's tree.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: String,
    pub original_name: String,
    pub content_type: String,
    pub parent_folder: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub node: Node,
    /// The upload matched an existing file; `node` is that file and nothing
    /// new was stored.
    pub duplicate: bool,
}

/// One file of a folder upload, addressed relative to the upload root.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub relative_path: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub relative_path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub uploaded: Vec<UploadOutcome>,
    pub failed: Vec<BatchFailure>,
}

/// Folder cache for a batch: (parent, name) -> folder id.
type FolderCache = HashMap<(Option<String>, String), String>;

impl Drive {
    /// Validate and store one uploaded file.
    ///
    /// The parent and quota checks run before any bytes are written. A file
    /// with the same original name, size and parent is treated as already
    /// uploaded. The duplicate check is repeated inside the insert
    /// transaction; if a concurrent upload won, the bytes written here are
    /// removed again.
    pub async fn upload(&self, req: UploadRequest) -> Result<UploadOutcome, DriveError> {
        let original_name = req.original_name.trim();
        if original_name.is_empty() {
            return Err(DriveError::Validation("File name cannot be empty".to_string()));
        }
        let owner_id = req.owner_id.as_str();
        let parent = req.parent_folder.as_deref();
        let size = req.data.len() as u64;

        self.resolve_parent(owner_id, parent)?;
        self.ensure_capacity(owner_id, size)?;

        if let Some(existing) = self
            .db
            .find_duplicate_file(owner_id, parent, original_name, size)?
        {
            debug!(node_id = %existing.id, name = %original_name, "Duplicate upload; keeping existing file");
            self.refresh_quota(owner_id);
            return Ok(UploadOutcome {
                node: existing,
                duplicate: true,
            });
        }

        let mime_type = resolve_mime(&req.content_type, original_name);
        let key = object_key(owner_id, original_name);
        self.store.put(&key, req.data).await?;

        let node = Node::new_file(owner_id, original_name, &mime_type, size, &key, parent);
        let inserted = match self.db.insert_file_dedup(&node) {
            Ok(inserted) => inserted,
            Err(e) => {
                self.discard_object(&key).await;
                return Err(e.into());
            }
        };

        if let FileInsert::Duplicate(existing) = inserted {
            debug!(node_id = %existing.id, key = %key, "Concurrent duplicate upload; discarding bytes");
            self.discard_object(&key).await;
            self.refresh_quota(owner_id);
            return Ok(UploadOutcome {
                node: existing,
                duplicate: true,
            });
        }

        info!(
            owner_id = %owner_id,
            node_id = %node.id,
            size,
            node_type = node.node_type.as_str(),
            "File uploaded"
        );
        self.record(ActivityEvent::for_node(ActivityKind::Upload, owner_id, &node))
            .await;
        self.refresh_quota(owner_id);
        Ok(UploadOutcome {
            node,
            duplicate: false,
        })
    }

    /// Upload a folder tree. Every intermediate folder named by an item's
    /// relative path is found or created before the file itself is placed.
    /// Items fail independently; the report lists both outcomes.
    pub async fn upload_batch(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
        items: Vec<BatchItem>,
    ) -> Result<BatchReport, DriveError> {
        self.resolve_parent(owner_id, parent_id)?;

        let mut folders = FolderCache::new();
        let mut report = BatchReport::default();

        for item in items {
            let relative_path = item.relative_path.clone();
            match self
                .place_batch_item(owner_id, parent_id, item, &mut folders)
                .await
            {
                Ok(outcome) => report.uploaded.push(outcome),
                Err(e) => {
                    warn!(owner_id = %owner_id, path = %relative_path, error = %e, "Batch item failed");
                    report.failed.push(BatchFailure {
                        relative_path,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            owner_id = %owner_id,
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            "Batch upload finished"
        );
        Ok(report)
    }

    async fn place_batch_item(
        &self,
        owner_id: &str,
        root: Option<&str>,
        item: BatchItem,
        folders: &mut FolderCache,
    ) -> Result<UploadOutcome, DriveError> {
        let segments = split_relative_path(&item.relative_path)?;
        let Some((file_name, dirs)) = segments.split_last() else {
            return Err(DriveError::Validation("Relative path is empty".to_string()));
        };

        let mut parent = root.map(|s| s.to_string());
        for dir in dirs {
            let folder_id = self
                .ensure_folder(owner_id, parent.as_deref(), dir, folders)
                .await?;
            parent = Some(folder_id);
        }

        self.upload(UploadRequest {
            owner_id: owner_id.to_string(),
            original_name: file_name.clone(),
            content_type: item.content_type,
            parent_folder: parent,
            data: item.data,
        })
        .await
    }

    /// Id of the live folder `name` under `parent`, creating it if needed.
    async fn ensure_folder(
        &self,
        owner_id: &str,
        parent: Option<&str>,
        name: &str,
        folders: &mut FolderCache,
    ) -> Result<String, DriveError> {
        let cache_key = (parent.map(|s| s.to_string()), name.to_string());
        if let Some(id) = folders.get(&cache_key) {
            return Ok(id.clone());
        }

        let id = match self.db.find_folder_by_name(owner_id, parent, name)? {
            Some(existing) => existing.id,
            None => match self.create_folder(owner_id, name, parent).await {
                Ok(folder) => folder.id,
                // Created concurrently between the lookup and the insert
                Err(DriveError::Conflict(_)) => self
                    .db
                    .find_folder_by_name(owner_id, parent, name)?
                    .map(|f| f.id)
                    .ok_or_else(|| {
                        DriveError::Integrity(format!(
                            "folder '{name}' reported as existing but not found"
                        ))
                    })?,
                Err(e) => return Err(e),
            },
        };

        folders.insert(cache_key, id.clone());
        Ok(id)
    }
}

/// Split an upload-relative path into its segments. Empty segments are
/// ignored; `.` and `..` are rejected.
pub(super) fn split_relative_path(path: &str) -> Result<Vec<String>, DriveError> {
    let normalized = path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in normalized.split('/').map(str::trim) {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(DriveError::Validation(format!(
                    "Relative path '{path}' must not contain '.' or '..'"
                )))
            }
            s => segments.push(s.to_string()),
        }
    }
    if segments.is_empty() {
        return Err(DriveError::Validation("Relative path is empty".to_string()));
    }
    Ok(segments)
}

/// Content type as declared, or guessed from the file name when the client
/// sent nothing useful.
fn resolve_mime(content_type: &str, file_name: &str) -> String {
    let declared = content_type.trim();
    if !declared.is_empty() && declared != FALLBACK_MIME {
        return declared.to_string();
    }
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Restrict a file name to characters that are safe inside a key segment.
pub(super) fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_KEY_NAME_LEN)
        .collect()
}

/// Fresh content-store key in the owner's area. The sanitized name is kept in
/// the key so the path reconciler can find the object by name later.
fn object_key(owner_id: &str, original_name: &str) -> String {
    format!(
        "{}/{}-{}",
        storage_area(owner_id),
        uuid::Uuid::new_v4(),
        sanitize_file_name(original_name)
    )
}
