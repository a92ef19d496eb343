use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::models::chat::SessionMeta;
use crate::services::SessionRegistry;
use crate::utils::error::ApiError;

/// Creates a new session with a fresh conversation memory.
pub async fn create_session(
    State(registry): State<Arc<SessionRegistry>>,
) -> (StatusCode, Json<SessionMeta>) {
    let meta = registry.create();
    info!("Session {} created", meta.id);
    (StatusCode::CREATED, Json(meta))
}

/// Metadata for all active sessions, creation order, no message content.
pub async fn list_sessions(
    State(registry): State<Arc<SessionRegistry>>,
) -> Json<Vec<SessionMeta>> {
    Json(registry.list())
}

/// Removes a session and its memory from RAM.
pub async fn delete_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if registry.delete(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Session not found".to_string()))
    }
}
