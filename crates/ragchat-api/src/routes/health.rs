use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_turns: usize,
    pub services: HashMap<String, String>,
}

/// Liveness check; does not call Azure or the store
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut services = HashMap::new();
    services.insert("store".to_string(), state.store_kind.to_string());
    services.insert(
        "chat_deployment".to_string(),
        state.orchestrator.config().deployment.clone(),
    );

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_turns: state.active_turns.len(),
        services,
    })
}
