//! Route table and layer stack.
//!
//! Layer order, outermost first: CORS, request tracing, rate limiting, then
//! per-route authentication. Rate limiting sits outside authentication so
//! throttled requests never cost a cache lookup.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::handlers;
use crate::middleware::{optional_auth, rate_limit, require_auth, require_roles, RoleGate};
use crate::models::user::UserRole;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cache = Arc::clone(&state.cache);
    let limiter = Arc::clone(&state.limiter);

    let public = Router::new()
        .route("/health", get(handlers::server::health))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login));

    let authenticated = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users/profile", get(handlers::users::profile))
        .route_layer(from_fn_with_state(Arc::clone(&cache), require_auth));

    let posts_read = Router::new()
        .route("/posts", get(handlers::posts::list))
        .route_layer(from_fn_with_state(Arc::clone(&cache), optional_auth));

    let posts_write = Router::new()
        .route("/posts", post(handlers::posts::create))
        .route_layer(from_fn_with_state(
            RoleGate::new(&[UserRole::Superuser, UserRole::Admin, UserRole::Instructor]),
            require_roles,
        ))
        .route_layer(from_fn_with_state(cache, require_auth));

    let api = public
        .merge(authenticated)
        .merge(posts_read)
        .merge(posts_write);

    Router::new()
        .nest("/api/v1", api)
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
