use axum::{extract::State, Extension, Json};

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::models::user::UserResponse;
use crate::state::AppState;

/// Profile of the authenticated user, fetched fresh so role or status
/// changes made after login are visible here. The attached session summary
/// comes from the durable store and is display-only.
pub async fn profile(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = state
        .users
        .find_by_id(context.user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let current_session = state.sessions.active_session(context.user_id).await?;

    Ok(Json(serde_json::json!({
        "user": UserResponse::from(&user),
        "current_session": current_session.map(|session| serde_json::json!({
            "device_info": session.device_info.0,
            "created_at": session.created_at,
            "last_activity_at": session.last_activity_at,
            "expires_at": session.expires_at,
        })),
    })))
}
