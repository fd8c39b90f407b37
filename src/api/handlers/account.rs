use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::nodes::{node_to_response, NodeResponse};
use crate::api::response::{ApiError, AppQuery, AuthUser, JSend};
use crate::storage::models::{ActivityEvent, ActivityKind};
use crate::AppState;

const MAX_RECENT_LIMIT: usize = 100;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    pub available: u64,
    pub computed_at: String,
    pub file_type_breakdown: BTreeMap<String, u64>,
    pub quota_bytes: u64,
    pub total_files: u64,
    pub total_folders: u64,
    pub used_storage: u64,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub created_at: String,
    pub details: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub id: String,
    pub kind: ActivityKind,
    pub target_user_id: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct RecentResponse {
    pub activity: Vec<ActivityResponse>,
    pub files: Vec<NodeResponse>,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn get_quota(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<JSend<QuotaResponse>>, ApiError> {
    let quota = state.drive.quota(&user_id)?;
    Ok(JSend::success(QuotaResponse {
        available: quota.available(),
        computed_at: quota.computed_at.to_rfc3339(),
        file_type_breakdown: quota.file_type_breakdown,
        quota_bytes: quota.quota_bytes,
        total_files: quota.total_files,
        total_folders: quota.total_folders,
        used_storage: quota.used_storage,
    }))
}

pub async fn get_recent(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppQuery(params): AppQuery<RecentParams>,
) -> Result<Json<JSend<RecentResponse>>, ApiError> {
    if params.limit == 0 || params.limit > MAX_RECENT_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_RECENT_LIMIT}"
        )));
    }

    let feed = state.drive.recent(&user_id, params.limit)?;
    Ok(JSend::success(RecentResponse {
        activity: feed.activity.iter().map(activity_to_response).collect(),
        files: feed
            .files
            .iter()
            .map(|n| node_to_response(n, &user_id))
            .collect(),
    }))
}

fn activity_to_response(event: &ActivityEvent) -> ActivityResponse {
    ActivityResponse {
        created_at: event.created_at.to_rfc3339(),
        details: event.details.clone(),
        file_id: event.file_id.clone(),
        file_name: event.file_name.clone(),
        id: event.id.clone(),
        kind: event.kind,
        target_user_id: event.target_user_id.clone(),
        user_id: event.user_id.clone(),
    }
}
