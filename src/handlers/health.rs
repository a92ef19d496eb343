use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::services::SessionRegistry;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    sessions_active: usize,
}

pub async fn health_check(
    State(registry): State<Arc<SessionRegistry>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions_active: registry.len(),
    })
}
