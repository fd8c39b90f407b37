use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;
    let batch_limit = state.config.max_batch_size as usize;

    let mut router = Router::new()
        // Tree
        .route("/nodes", get(handlers::list_nodes))
        .route(
            "/nodes/:id",
            get(handlers::get_node).delete(handlers::delete_node),
        )
        .route("/nodes/:id/content", get(handlers::download_node))
        .route("/nodes/:id/name", put(handlers::rename_node))
        .route("/nodes/:id/parent", put(handlers::move_node))
        .route("/nodes/:id/copy", post(handlers::copy_node))
        .route("/folders", post(handlers::create_folder))
        // Uploads
        .route(
            "/files",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/files/batch",
            post(handlers::upload_batch).layer(DefaultBodyLimit::max(batch_limit)),
        )
        // Trash
        .route("/nodes/:id/trash", post(handlers::trash_node))
        .route("/nodes/:id/restore", post(handlers::restore_node))
        .route(
            "/trash",
            get(handlers::list_trash).delete(handlers::empty_trash),
        )
        // Sharing
        .route("/nodes/:id/shares", post(handlers::share_node))
        .route(
            "/nodes/:id/shares/:user_id",
            delete(handlers::unshare_node),
        )
        .route(
            "/nodes/:id/public",
            post(handlers::make_public).delete(handlers::revoke_public),
        )
        .route("/shared", get(handlers::list_shared))
        .route("/public/:token", get(handlers::serve_public))
        // Account
        .route("/quota", get(handlers::get_quota))
        .route("/recent", get(handlers::get_recent))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
