//! Registration, login, and logout endpoints.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::models::user::{LoginRequest, RegisterRequest};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let response = state.sessions.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(mut request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    // Clients rarely know their own public address; record what the edge saw
    // unless the payload already carries one.
    if request.device_info.ip_address.is_empty() {
        request.device_info.ip_address = client_ip(&headers, addr);
    }

    let response = state.sessions.login(request).await?;
    Ok(Json(response))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions
        .logout(&context.session.token, context.user_id)
        .await?;
    Ok(Json(
        serde_json::json!({ "message": "Logged out successfully" }),
    ))
}

fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}
