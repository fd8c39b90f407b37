use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::nodes::{node_to_response, NodeResponse};
use crate::api::response::{ApiError, AppJson, AuthUser, JSend};
use crate::drive::{BatchItem, UploadOutcome, UploadRequest};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub duplicate: bool,
    pub node: NodeResponse,
}

#[derive(Debug, Serialize)]
pub struct BatchFailureResponse {
    pub error: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct BatchUploadResponse {
    pub failed: Vec<BatchFailureResponse>,
    pub uploaded: Vec<UploadResponse>,
}

/// A buffered `file` part of a multipart body.
struct FilePart {
    content_type: String,
    data: Bytes,
    file_name: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<CreateFolderRequest>,
) -> Result<(StatusCode, Json<JSend<NodeResponse>>), ApiError> {
    let folder = state
        .drive
        .create_folder(&user_id, &req.name, req.parent_id.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        JSend::success(node_to_response(&folder, &user_id)),
    ))
}

/// Upload a single file. Fields: `file` (required), `parent_id` (optional).
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<UploadResponse>>), ApiError> {
    let (mut files, parent_id) = read_upload_form(&state, multipart).await?;
    if files.len() > 1 {
        return Err(ApiError::bad_request(
            "Only one file per request; use /files/batch for folders",
        ));
    }
    let file = files
        .pop()
        .ok_or_else(|| ApiError::bad_request("file field is required"))?;

    // Browsers may send a directory-qualified name; only the last segment counts
    let original_name = file
        .file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string();

    let outcome = state
        .drive
        .upload(UploadRequest {
            owner_id: user_id.clone(),
            original_name,
            content_type: file.content_type,
            parent_folder: parent_id,
            data: file.data,
        })
        .await?;

    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, JSend::success(upload_to_response(&outcome, &user_id))))
}

/// Upload a folder tree. Each `file` part's file name is its path relative to
/// `parent_id` (or root), e.g. `Photos/2024/beach.jpg`.
pub async fn upload_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> Result<Json<JSend<BatchUploadResponse>>, ApiError> {
    let (files, parent_id) = read_upload_form(&state, multipart).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("at least one file field is required"));
    }

    let items = files
        .into_iter()
        .map(|f| BatchItem {
            relative_path: f.file_name,
            content_type: f.content_type,
            data: f.data,
        })
        .collect();

    let report = state
        .drive
        .upload_batch(&user_id, parent_id.as_deref(), items)
        .await?;

    Ok(JSend::success(BatchUploadResponse {
        failed: report
            .failed
            .into_iter()
            .map(|f| BatchFailureResponse {
                error: f.error,
                path: f.relative_path,
            })
            .collect(),
        uploaded: report
            .uploaded
            .iter()
            .map(|o| upload_to_response(o, &user_id))
            .collect(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn upload_to_response(outcome: &UploadOutcome, viewer_id: &str) -> UploadResponse {
    UploadResponse {
        duplicate: outcome.duplicate,
        node: node_to_response(&outcome.node, viewer_id),
    }
}

async fn read_upload_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(Vec<FilePart>, Option<String>), ApiError> {
    let mut files = Vec::new();
    let mut parent_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => files.push(read_file_part(state, field).await?),
            "parent_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid parent_id: {e}")))?;
                let text = text.trim();
                parent_id = (!text.is_empty()).then(|| text.to_string());
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    Ok((files, parent_id))
}

/// Read a `file` part chunk by chunk, failing as soon as it passes
/// `max_upload_size` instead of buffering the whole part first.
async fn read_file_part(state: &AppState, mut field: Field<'_>) -> Result<FilePart, ApiError> {
    let file_name = field
        .file_name()
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::bad_request("file field must carry a file name"))?;
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_default();

    let mut data = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?
    {
        append_within_limit(&mut data, &chunk, state.config.max_upload_size)?;
    }

    Ok(FilePart {
        content_type,
        data: data.freeze(),
        file_name,
    })
}

fn append_within_limit(buf: &mut BytesMut, chunk: &[u8], limit: u64) -> Result<(), ApiError> {
    if (buf.len() + chunk.len()) as u64 > limit {
        return Err(ApiError::payload_too_large(format!(
            "File exceeds maximum upload size of {limit} bytes"
        )));
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::{FromRequest, Request};
    use axum::http::header::CONTENT_TYPE;

    use crate::testutil::test_state;

    const BOUNDARY: &str = "drive-store-boundary";

    async fn form_with_file(name: &str, data: &[u8]) -> Multipart {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let req = Request::builder()
            .method("POST")
            .uri("/files")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(req, &()).await.unwrap()
    }

    #[test]
    fn test_append_within_limit_stops_at_limit() {
        let mut buf = BytesMut::new();
        append_within_limit(&mut buf, b"abcd", 6).unwrap();
        append_within_limit(&mut buf, b"ef", 6).unwrap();

        match append_within_limit(&mut buf, b"g", 6) {
            Err(ApiError::Fail(code, _)) => assert_eq!(code, StatusCode::PAYLOAD_TOO_LARGE),
            other => panic!("expected 413, got {other:?}"),
        }
        assert_eq!(&buf[..], b"abcdef");
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(&dir);
        Arc::get_mut(&mut state).unwrap().config.max_upload_size = 8;

        let form = form_with_file("big.txt", &[b'x'; 32]).await;
        let result = upload_file(
            State(Arc::clone(&state)),
            AuthUser("alice".to_string()),
            form,
        )
        .await;
        match result {
            Err(ApiError::Fail(code, _)) => assert_eq!(code, StatusCode::PAYLOAD_TOO_LARGE),
            _ => panic!("oversized upload should be rejected"),
        }
        assert!(state.drive.list_children("alice", None).unwrap().is_empty());

        let form = form_with_file("fits.txt", &[b'x'; 8]).await;
        let (status, Json(body)) = upload_file(
            State(Arc::clone(&state)),
            AuthUser("alice".to_string()),
            form,
        )
        .await
        .unwrap_or_else(|_| panic!("upload at the limit should succeed"));
        assert_eq!(status, StatusCode::CREATED);
        assert!(!body.data.duplicate);
        assert_eq!(body.data.node.size, 8);
    }
}
