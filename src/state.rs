use std::sync::Arc;

use axum::extract::FromRef;

use crate::services::{RagService, SessionRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub rag_service: Arc<RagService>,
}

impl FromRef<AppState> for Arc<SessionRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl FromRef<AppState> for Arc<RagService> {
    fn from_ref(state: &AppState) -> Self {
        state.rag_service.clone()
    }
}
