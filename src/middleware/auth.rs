//! Per-request authentication gate and role authorization.
//!
//! Validation is served entirely from the session cache. Cache outages,
//! missing sessions, unhealthy sessions, and load failures all collapse to
//! the same unauthorized response so a caller cannot tell which occurred.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::cache::SessionCache;
use crate::error::AppError;
use crate::models::session::Session;
use crate::models::user::UserRole;

/// Identity attached to the request after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session: Session,
    pub role: UserRole,
    pub user_id: Uuid,
}

impl From<Session> for AuthContext {
    fn from(session: Session) -> Self {
        AuthContext {
            role: session.role,
            user_id: session.user_id,
            session,
        }
    }
}

/// Two-token whitespace split of the Authorization header. Malformed headers
/// yield no token, never an error.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = raw.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.to_string())
}

/// Rejects requests without a live session.
pub async fn require_auth(
    State(cache): State<Arc<dyn SessionCache>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    handle_auth(cache, request, next, false).await
}

/// Passes unauthenticated requests through anonymously, but still rejects a
/// token that is present and invalid.
pub async fn optional_auth(
    State(cache): State<Arc<dyn SessionCache>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    handle_auth(cache, request, next, true).await
}

async fn handle_auth(
    cache: Arc<dyn SessionCache>,
    mut request: Request,
    next: Next,
    optional: bool,
) -> Result<Response, AppError> {
    let Some(token) = extract_bearer_token(request.headers()) else {
        if optional {
            return Ok(next.run(request).await);
        }
        return Err(AppError::Unauthorized(
            "Authorization header was not provided".to_string(),
        ));
    };

    // Cheap existence check first; a cache failure degrades to unauthorized
    // rather than crashing the request.
    let valid = cache.validate(&token).await.unwrap_or(false);
    if !valid {
        return Err(AppError::Unauthorized(
            "Invalid or expired session".to_string(),
        ));
    }

    if !cache.is_healthy(&token).await {
        return Err(AppError::Unauthorized(
            "Session expired or revoked".to_string(),
        ));
    }

    let session = cache
        .get(&token)
        .await
        .ok()
        .flatten()
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

    request.extensions_mut().insert(AuthContext::from(session));
    Ok(next.run(request).await)
}

/// Allowed-role set for a route group. Membership is checked in O(1).
#[derive(Clone)]
pub struct RoleGate {
    allowed: Arc<HashSet<UserRole>>,
}

impl RoleGate {
    pub fn new(roles: &[UserRole]) -> Self {
        Self {
            allowed: Arc::new(roles.iter().copied().collect()),
        }
    }
}

/// Second authorization layer; consumes the [`AuthContext`] attached by
/// [`require_auth`].
pub async fn require_roles(
    State(gate): State<RoleGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = request.extensions().get::<AuthContext>().ok_or_else(|| {
        AppError::Unauthorized("Invalid or expired session. Please login again".to_string())
    })?;

    if !gate.allowed.contains(&context.role) {
        return Err(AppError::Forbidden(
            "You don't have permission to access this resource".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
