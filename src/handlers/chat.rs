use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::Response,
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use crate::models::chat::{ChatRequest, StreamEvent};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Streams one orchestrated turn as NDJSON, one JSON object per line:
///
/// ```text
/// {"type":"strategy","strategy":"complex|multi_hop|simple_conversation"}
/// {"type":"reasoning","subqueries":[...]}          <- optional
/// {"type":"token","content":"word "}               <- repeated
/// {"type":"sources","sources":[...]}
/// {"type":"done"}
/// {"type":"error","message":"..."}                 <- terminal, replaces the rest
/// ```
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Query cannot be empty".to_string()));
    }

    if state.registry.get(&request.session_id).is_none() {
        return Err(ApiError::NotFound(
            "Session not found. Create one first.".to_string(),
        ));
    }

    info!(
        "Chat request: session={}, query_len={}",
        request.session_id,
        query.len()
    );

    let events = state
        .rag_service
        .clone()
        .stream_response(request.session_id, query);

    let body = Body::from_stream(
        events.map(|event| Ok::<Bytes, Infallible>(Bytes::from(ndjson_line(&event)))),
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        // disable nginx response buffering
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| ApiError::InternalError(e.to_string()))
}

fn ndjson_line(event: &StreamEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","message":"event serialization failed"}"#.to_string()
    });
    line.push('\n');
    line
}
