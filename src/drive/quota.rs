use std::collections::BTreeMap;

use chrono::Utc;

use super::{Drive, DriveError};
use crate::storage::models::{Node, QuotaRecord};

/// Derive an account's usage from its nodes. Trashed nodes do not count.
pub fn compute_usage(owner_id: &str, nodes: &[Node], quota_bytes: u64) -> QuotaRecord {
    let mut used_storage = 0u64;
    let mut total_files = 0u64;
    let mut total_folders = 0u64;
    let mut file_type_breakdown: BTreeMap<String, u64> = BTreeMap::new();

    for node in nodes.iter().filter(|n| n.owner_id == owner_id && !n.in_trash) {
        if node.is_folder {
            total_folders += 1;
            continue;
        }
        total_files += 1;
        used_storage = used_storage.saturating_add(node.size);
        *file_type_breakdown
            .entry(node.node_type.as_str().to_string())
            .or_insert(0) += node.size;
    }

    QuotaRecord {
        owner_id: owner_id.to_string(),
        used_storage,
        total_files,
        total_folders,
        file_type_breakdown,
        quota_bytes,
        computed_at: Utc::now(),
    }
}

impl Drive {
    /// Recompute an account's usage from its node set and store the result.
    pub fn recompute_quota(&self, owner_id: &str) -> Result<QuotaRecord, DriveError> {
        let nodes = self.db.get_nodes_by_owner(owner_id)?;
        let record = compute_usage(owner_id, &nodes, self.config.quota_bytes);
        self.db.put_quota(&record)?;
        Ok(record)
    }

    /// Current usage. Always recomputed; stored snapshots are never trusted.
    pub fn quota(&self, owner_id: &str) -> Result<QuotaRecord, DriveError> {
        self.recompute_quota(owner_id)
    }

    /// Recompute after a mutation. The mutation already happened, so a
    /// failure here is logged and picked up by the next recomputation.
    pub(super) fn refresh_quota(&self, owner_id: &str) {
        if let Err(e) = self.recompute_quota(owner_id) {
            tracing::warn!(owner_id = %owner_id, error = %e, "Failed to recompute quota");
        }
    }

    /// Fail with `QuotaExceeded` if `incoming` more bytes would pass the ceiling.
    pub(super) fn ensure_capacity(&self, owner_id: &str, incoming: u64) -> Result<(), DriveError> {
        let usage = self.recompute_quota(owner_id)?;
        if usage.used_storage.saturating_add(incoming) > usage.quota_bytes {
            return Err(DriveError::QuotaExceeded {
                used: usage.used_storage,
                incoming,
                limit: usage.quota_bytes,
            });
        }
        Ok(())
    }
}
