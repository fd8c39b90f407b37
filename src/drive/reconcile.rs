//! Download path and lazy content-key repair.
//!
//! A node's `path` can go stale when the object behind it is moved outside
//! this service. When that happens the reconciler looks for the object by
//! size and name and rebinds the node to whatever it finds.
//!
//! Best-match contract: candidates are visited in lexicographic key order.
//! The first object in the owner's area matching both size and name wins,
//! then the first such object anywhere in the store, then the first
//! name-only match (owner's area first). The result is deterministic for a
//! given listing but is still a heuristic: two objects with the same name
//! stem and size are indistinguishable.

use std::path::Path;

use bytes::Bytes;
use tracing::{info, warn};

use super::upload::sanitize_file_name;
use super::{storage_area, Drive, DriveError};
use crate::object_store::{ObjectInfo, ObjectStoreError};
use crate::storage::models::Node;

/// File bytes plus the node they belong to.
#[derive(Debug, Clone)]
pub struct Download {
    pub node: Node,
    pub data: Bytes,
}

impl Drive {
    /// Fetch a file the user owns or has been shared.
    pub async fn download(&self, user_id: &str, node_id: &str) -> Result<Download, DriveError> {
        let node = self.accessible_node(user_id, node_id)?;
        if node.in_trash && node.owner_id != user_id {
            return Err(DriveError::NotFound("Node".to_string()));
        }
        if node.is_folder {
            return Err(DriveError::Validation(
                "Folders cannot be downloaded".to_string(),
            ));
        }
        self.fetch_content(node).await
    }

    /// Fetch a file through its public link token.
    pub async fn download_public(&self, token: &str) -> Result<Download, DriveError> {
        let node = self
            .db
            .get_node_by_public_url(token)?
            .filter(|n| n.is_public && !n.in_trash && !n.is_folder)
            .ok_or_else(|| DriveError::NotFound("Public link".to_string()))?;
        self.fetch_content(node).await
    }

    async fn fetch_content(&self, node: Node) -> Result<Download, DriveError> {
        let Some(path) = node.path.clone() else {
            return Err(DriveError::ContentMissing(node.id));
        };

        let (node, key) = if self.store.exists(&path).await? {
            (node, path)
        } else {
            warn!(node_id = %node.id, path = %path, "Stored path does not resolve; reconciling");
            let key = self.reconcile_path(&node).await?;
            let node = self.db.get_node(&node.id)?.unwrap_or(node);
            (node, key)
        };

        match self.store.get(&key).await {
            Ok(data) => Ok(Download { node, data }),
            Err(ObjectStoreError::NotFound(_)) => Err(DriveError::ContentMissing(node.id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the object a stale node most likely refers to and rebind the
    /// node's `path` to it. Listing failures degrade to `ContentMissing`.
    pub async fn reconcile_path(&self, node: &Node) -> Result<String, DriveError> {
        let stems = match_stems(node.match_name());
        if stems.is_empty() {
            return Err(DriveError::ContentMissing(node.id.clone()));
        }

        let own_prefix = format!("{}/", storage_area(&node.owner_id));
        let own = self.list_candidates(&own_prefix).await;
        if let Some(hit) = find_exact_match(&own, &stems, node.size) {
            return self.rebind(node, &hit.key);
        }

        let all = self.list_candidates("").await;
        let hit = find_exact_match(&all, &stems, node.size)
            .or_else(|| find_name_match(&own, &stems))
            .or_else(|| find_name_match(&all, &stems));

        match hit {
            Some(hit) => self.rebind(node, &hit.key),
            None => {
                warn!(node_id = %node.id, name = %node.match_name(), "No candidate object found");
                Err(DriveError::ContentMissing(node.id.clone()))
            }
        }
    }

    async fn list_candidates(&self, prefix: &str) -> Vec<ObjectInfo> {
        match self.store.list(prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Failed to list objects for reconciliation");
                Vec::new()
            }
        }
    }

    fn rebind(&self, node: &Node, key: &str) -> Result<String, DriveError> {
        self.db
            .update_node(&node.id, |n| n.path = Some(key.to_string()))?
            .ok_or_else(|| DriveError::NotFound("Node".to_string()))?;
        info!(
            node_id = %node.id,
            from = node.path.as_deref().unwrap_or(""),
            to = %key,
            "Rebound node to recovered object"
        );
        Ok(key.to_string())
    }
}

/// Lower-cased name stems an object name is matched against: the raw stem
/// and, if different, its key-sanitized form.
pub fn match_stems(name: &str) -> Vec<String> {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.trim().to_lowercase();
    if stem.is_empty() {
        return Vec::new();
    }

    let sanitized = sanitize_file_name(&stem);
    if sanitized == stem {
        vec![stem]
    } else {
        vec![stem, sanitized]
    }
}

fn name_matches(candidate: &ObjectInfo, stems: &[String]) -> bool {
    let file_name = candidate.file_name().to_lowercase();
    stems.iter().any(|stem| file_name.contains(stem.as_str()))
}

/// First candidate matching both size and name.
pub fn find_exact_match<'a>(
    candidates: &'a [ObjectInfo],
    stems: &[String],
    size: u64,
) -> Option<&'a ObjectInfo> {
    candidates
        .iter()
        .find(|c| c.size == size && name_matches(c, stems))
}

/// First candidate matching by name alone.
pub fn find_name_match<'a>(candidates: &'a [ObjectInfo], stems: &[String]) -> Option<&'a ObjectInfo> {
    candidates.iter().find(|c| name_matches(c, stems))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;

    fn object(key: &str, size: u64) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size,
        }
    }

    #[test]
    fn test_match_stems() {
        assert_eq!(match_stems("Report.PDF"), vec!["report"]);
        assert_eq!(match_stems("My Notes.txt"), vec!["my notes", "my_notes"]);
        assert!(match_stems("").is_empty());
    }

    #[test]
    fn test_exact_match_prefers_size() {
        let stems = match_stems("photo.jpg");
        let candidates = vec![
            object("u/1-photo.jpg", 10),
            object("u/2-PHOTO.jpg", 500),
            object("u/3-other.jpg", 500),
        ];

        let hit = find_exact_match(&candidates, &stems, 500).unwrap();
        assert_eq!(hit.key, "u/2-PHOTO.jpg");
        assert!(find_exact_match(&candidates, &stems, 999).is_none());
        assert_eq!(
            find_name_match(&candidates, &stems).unwrap().key,
            "u/1-photo.jpg"
        );
    }

    #[tokio::test]
    async fn test_download_rebinds_stale_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut node = state
            .drive
            .upload(crate::drive::UploadRequest {
                owner_id: "alice".to_string(),
                original_name: "holiday.png".to_string(),
                content_type: "image/png".to_string(),
                parent_folder: None,
                data: Bytes::from_static(b"pixels"),
            })
            .await
            .unwrap()
            .node;

        // Simulate the object being moved outside the service
        let old_key = node.path.clone().unwrap();
        let new_key = "alice/archive/holiday.png";
        let bytes = state.object_store.get(&old_key).await.unwrap();
        state.object_store.put(new_key, bytes).await.unwrap();
        state.object_store.delete(&old_key).await.unwrap();

        let download = state.drive.download("alice", &node.id).await.unwrap();
        assert_eq!(download.data, Bytes::from_static(b"pixels"));
        assert_eq!(download.node.path.as_deref(), Some(new_key));

        node = state.db.get_node(&node.id).unwrap().unwrap();
        assert_eq!(node.path.as_deref(), Some(new_key));
    }

    #[tokio::test]
    async fn test_download_searches_other_areas_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let node = state
            .drive
            .upload(crate::drive::UploadRequest {
                owner_id: "bob".to_string(),
                original_name: "thesis.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                parent_folder: None,
                data: Bytes::from_static(b"chapter one"),
            })
            .await
            .unwrap()
            .node;

        let old_key = node.path.clone().unwrap();
        state.object_store.delete(&old_key).await.unwrap();
        state
            .object_store
            .put("carol/thesis.pdf", Bytes::from_static(b"chapter one"))
            .await
            .unwrap();

        let download = state.drive.download("bob", &node.id).await.unwrap();
        assert_eq!(download.node.path.as_deref(), Some("carol/thesis.pdf"));

        state.object_store.delete("carol/thesis.pdf").await.unwrap();
        let err = state.drive.download("bob", &node.id).await.unwrap_err();
        assert!(matches!(err, DriveError::ContentMissing(_)));
    }
}
