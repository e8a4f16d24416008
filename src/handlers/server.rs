use axum::{extract::State, Json};

use crate::state::AppState;

/// Liveness probe with build metadata. Deliberately does not touch the
/// database or the cache, so it stays green while dependencies flap.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.config.app_version,
        "environment": state.config.app_env,
    }))
}
