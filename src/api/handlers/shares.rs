use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::nodes::{content_response, node_to_response, NodeResponse};
use crate::api::response::{ApiError, AppJson, AppQuery, AuthUser, JSend};
use crate::storage::models::Permission;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub user_id: String,
    #[serde(default = "default_permission")]
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct PublicLinkResponse {
    pub path: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedDirection {
    #[default]
    WithMe,
    ByMe,
}

#[derive(Debug, Deserialize)]
pub struct SharedParams {
    #[serde(default)]
    pub direction: SharedDirection,
}

fn default_permission() -> Permission {
    Permission::View
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn share_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<ShareRequest>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state
        .drive
        .share(&user_id, &id, &req.user_id, req.permission)
        .await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn unshare_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((id, target_user_id)): Path<(String, String)>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state.drive.unshare(&user_id, &id, &target_user_id).await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn make_public(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<PublicLinkResponse>>, ApiError> {
    let token = state.drive.make_public(&user_id, &id).await?;
    Ok(JSend::success(PublicLinkResponse {
        path: format!("/public/{token}"),
        token,
    }))
}

pub async fn revoke_public(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state.drive.revoke_public(&user_id, &id).await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

/// `?direction=with_me` (default) lists what others shared with the caller,
/// `?direction=by_me` what the caller has shared out.
pub async fn list_shared(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppQuery(params): AppQuery<SharedParams>,
) -> Result<Json<JSend<Vec<NodeResponse>>>, ApiError> {
    let nodes = match params.direction {
        SharedDirection::WithMe => state.drive.shared_with_me(&user_id)?,
        SharedDirection::ByMe => state.drive.shared_by_me(&user_id)?,
    };
    Ok(JSend::success(
        nodes.iter().map(|n| node_to_response(n, &user_id)).collect(),
    ))
}

/// Unauthenticated download through a public link token.
pub async fn serve_public(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.drive.download_public(&token).await?;
    Ok(content_response(
        download,
        "inline",
        "public, max-age=300",
    ))
}
