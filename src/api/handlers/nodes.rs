use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{
    ApiError, AppJson, AppQuery, AuthUser, JSend, JSendPaginated, Pagination,
};
use crate::drive::Download;
use crate::storage::models::{Node, NodeType, Permission};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub permission: Permission,
    pub shared_at: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub created_at: String,
    pub deleted_at: Option<String>,
    pub id: String,
    pub in_trash: bool,
    pub is_folder: bool,
    pub is_public: bool,
    pub mime_type: Option<String>,
    pub name: String,
    pub original_name: Option<String>,
    pub owner_id: String,
    pub parent_folder: Option<String>,
    pub permanent_delete_at: Option<String>,
    pub public_url: Option<String>,
    pub shared_with: Vec<ShareResponse>,
    pub size: u64,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListNodesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListTrashParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Destination of a move or copy; a missing or null `parent_id` means root.
#[derive(Debug, Deserialize)]
pub struct DestinationRequest {
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmptyTrashResponse {
    pub deleted: u64,
}

fn default_limit() -> u32 {
    50
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppQuery(params): AppQuery<ListNodesParams>,
) -> Result<Json<JSendPaginated<NodeResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }
    let nodes = state
        .drive
        .list_children(&user_id, params.parent_id.as_deref())?;
    Ok(paginate(&nodes, &user_id, params.limit, params.offset))
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state.drive.get(&user_id, &id)?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn download_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.drive.download(&user_id, &id).await?;
    Ok(content_response(download, "attachment", "private, no-cache"))
}

pub async fn rename_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameRequest>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state.drive.rename(&user_id, &id, &req.name).await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn move_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<DestinationRequest>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state
        .drive
        .move_node(&user_id, &id, req.parent_id.as_deref())
        .await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn copy_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<DestinationRequest>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state
        .drive
        .copy(&user_id, &id, req.parent_id.as_deref())
        .await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn trash_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state.drive.trash(&user_id, &id).await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn restore_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<NodeResponse>>, ApiError> {
    let node = state.drive.restore(&user_id, &id).await?;
    Ok(JSend::success(node_to_response(&node, &user_id)))
}

pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.drive.permanent_delete(&user_id, &id).await?;
    Ok(JSend::success(()))
}

pub async fn list_trash(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppQuery(params): AppQuery<ListTrashParams>,
) -> Result<Json<JSendPaginated<NodeResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }
    let nodes = state.drive.list_trash(&user_id)?;
    Ok(paginate(&nodes, &user_id, params.limit, params.offset))
}

pub async fn empty_trash(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<JSend<EmptyTrashResponse>>, ApiError> {
    let deleted = state.drive.empty_trash(&user_id).await?;
    Ok(JSend::success(EmptyTrashResponse { deleted }))
}

// ============================================================================
// Helpers
// ============================================================================

fn paginate(
    nodes: &[Node],
    viewer_id: &str,
    limit: u32,
    offset: u32,
) -> Json<JSendPaginated<NodeResponse>> {
    let total = nodes.len() as u64;
    let items: Vec<NodeResponse> = nodes
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(|n| node_to_response(n, viewer_id))
        .collect();

    JSendPaginated::success(
        items,
        Pagination {
            limit,
            offset,
            total,
        },
    )
}

/// Sharing details are only shown to the owner.
pub(super) fn node_to_response(node: &Node, viewer_id: &str) -> NodeResponse {
    let is_owner = node.owner_id == viewer_id;
    NodeResponse {
        created_at: node.created_at.to_rfc3339(),
        deleted_at: node.deleted_at.map(|d| d.to_rfc3339()),
        id: node.id.clone(),
        in_trash: node.in_trash,
        is_folder: node.is_folder,
        is_public: node.is_public,
        mime_type: node.mime_type.clone(),
        name: node.name.clone(),
        original_name: node.original_name.clone(),
        owner_id: node.owner_id.clone(),
        parent_folder: node.parent_folder.clone(),
        permanent_delete_at: node.permanent_delete_at.map(|d| d.to_rfc3339()),
        public_url: if is_owner {
            node.public_url.clone()
        } else {
            None
        },
        shared_with: if is_owner {
            node.shared_with
                .iter()
                .map(|s| ShareResponse {
                    permission: s.permission,
                    shared_at: s.shared_at.to_rfc3339(),
                    user_id: s.user_id.clone(),
                })
                .collect()
        } else {
            Vec::new()
        },
        size: node.size,
        node_type: node.node_type,
        updated_at: node.updated_at.to_rfc3339(),
    }
}

/// Build a byte response with content headers for a downloaded file.
pub(super) fn content_response(
    download: Download,
    disposition: &str,
    cache_control: &'static str,
) -> Response {
    let Download { node, data } = download;
    let length = data.len() as u64;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    let mime_type = node
        .mime_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let filename = node.name.replace('"', "");
    if let Ok(value) = format!("{disposition}; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::ShareEntry;
    use crate::testutil::test_state;

    #[test]
    fn test_node_response_hides_sharing_from_recipients() {
        let mut node = Node::new_file("alice", "plan.txt", "text/plain", 4, "alice/k", None);
        node.is_public = true;
        node.public_url = Some("token".to_string());
        node.shared_with.push(ShareEntry {
            user_id: "bob".to_string(),
            permission: Permission::View,
            shared_at: chrono::Utc::now(),
        });

        let owner_view = node_to_response(&node, "alice");
        assert_eq!(owner_view.public_url.as_deref(), Some("token"));
        assert_eq!(owner_view.shared_with.len(), 1);

        let recipient_view = node_to_response(&node, "bob");
        assert!(recipient_view.public_url.is_none());
        assert!(recipient_view.shared_with.is_empty());
        assert!(recipient_view.is_public);
    }

    #[tokio::test]
    async fn test_list_nodes_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        for name in ["a", "b", "c"] {
            state.drive.create_folder("alice", name, None).await.unwrap();
        }

        let Json(page) = list_nodes(
            State(Arc::clone(&state)),
            AuthUser("alice".to_string()),
            AppQuery(ListNodesParams {
                limit: 2,
                offset: 1,
                parent_id: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(page.data.pagination.total, 3);
        let names: Vec<&str> = page.data.items.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_download_sets_content_headers() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let node = state
            .drive
            .upload(crate::drive::UploadRequest {
                owner_id: "alice".to_string(),
                original_name: "notes.txt".to_string(),
                content_type: "text/plain".to_string(),
                parent_folder: None,
                data: bytes::Bytes::from_static(b"hello"),
            })
            .await
            .unwrap()
            .node;

        let response = download_node(
            State(Arc::clone(&state)),
            AuthUser("alice".to_string()),
            Path(node.id.clone()),
        )
        .await
        .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"notes.txt\""
        );

        let missing = download_node(
            State(state),
            AuthUser("mallory".to_string()),
            Path(node.id),
        )
        .await;
        assert!(matches!(
            missing,
            Err(ApiError::Fail(code, _)) if code == StatusCode::NOT_FOUND
        ));
    }
}
