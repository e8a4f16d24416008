//! End-to-end API tests over the full router with mocked stores, covering
//! the login flow, session-gated routes, role gating, and rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::{Extension, Router};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use mockall::mock;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use coursehub_backend::cache::SessionCache;
use coursehub_backend::config::Config;
use coursehub_backend::models::session::{DeviceInfo, Session};
use coursehub_backend::models::user::{User, UserRole};
use coursehub_backend::repositories::{SessionStore, UserStore};
use coursehub_backend::router::build_router;
use coursehub_backend::services::{FixedWindowRateLimiter, SessionManager};
use coursehub_backend::state::AppState;
use coursehub_backend::utils::password::hash_password;

mock! {
    Cache {}

    #[async_trait]
    impl SessionCache for Cache {
        async fn store(&self, session: &Session) -> anyhow::Result<()>;
        async fn get(&self, token: &str) -> anyhow::Result<Option<Session>>;
        async fn validate(&self, token: &str) -> anyhow::Result<bool>;
        async fn is_healthy(&self, token: &str) -> bool;
        async fn invalidate(&self, token: &str, user_id: Uuid) -> anyhow::Result<()>;
        async fn active_token_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<String>>;
    }
}

mock! {
    Users {}

    #[async_trait]
    impl UserStore for Users {
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
        async fn insert(&self, user: &User) -> anyhow::Result<()>;
    }
}

mock! {
    Sessions {}

    #[async_trait]
    impl SessionStore for Sessions {
        async fn create(&self, session: &Session) -> anyhow::Result<()>;
        async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<Session>>;
        async fn get_active_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<Session>>;
        async fn mark_revoked(&self, token: &str, reason: &str) -> anyhow::Result<()>;
        async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> anyhow::Result<u64>;
        async fn delete_revoked_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
    }
}

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/unused".into(),
        redis_url: "redis://localhost:6379".into(),
        redis_pool_size: 1,
        redis_connect_timeout: 1,
        server_port: 0,
        app_version: "test".into(),
        app_env: "test".into(),
        session_duration_hours: 24,
        refresh_token_duration_days: 7,
        session_retention_days: 7,
        cleanup_interval_hours: 24,
        rate_limit_max_requests: 100,
        rate_limit_window_seconds: 60,
        rate_limit_enabled: true,
        cors_allow_origins: vec!["http://localhost:3000".into()],
    }
}

fn app_with(cache: MockCache, users: MockUsers, sessions: MockSessions, limit: u32) -> Router {
    let cache: Arc<dyn SessionCache> = Arc::new(cache);
    let users: Arc<dyn UserStore> = Arc::new(users);
    let sessions: Arc<dyn SessionStore> = Arc::new(sessions);

    let manager = Arc::new(SessionManager::new(
        Arc::clone(&users),
        Arc::clone(&sessions),
        Arc::clone(&cache),
        chrono::Duration::hours(24),
    ));
    let limiter = Arc::new(FixedWindowRateLimiter::new(
        limit,
        Duration::from_secs(60),
        true,
    ));

    // Lazy pool: no handler under test touches the database directly.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();

    let state = AppState::new(pool, cache, users, manager, limiter, test_config());
    build_router(state).layer(Extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)))))
}

fn known_user(password: &str, role: UserRole) -> User {
    User::new(
        "alice@example.com".into(),
        hash_password(password).unwrap(),
        "Alice".into(),
        "Example".into(),
        role,
    )
}

fn live_session(user: &User, token: &str) -> Session {
    Session::new(
        user.id,
        user.role,
        token.into(),
        "refresh".into(),
        DeviceInfo::default(),
        Utc::now() + chrono::Duration::hours(1),
    )
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_version_and_environment() {
    let app = app_with(MockCache::new(), MockUsers::new(), MockSessions::new(), 100);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], "test");
    assert_eq!(json["environment"], "test");
}

#[tokio::test]
async fn login_returns_tokens_and_writes_the_cache() {
    let user = known_user("correct horse battery", UserRole::Student);

    let mut users = MockUsers::new();
    let found = user.clone();
    users
        .expect_find_by_email()
        .withf(|email| email == "alice@example.com")
        .returning(move |_| Ok(Some(found.clone())));

    let mut cache = MockCache::new();
    cache.expect_active_token_for_user().returning(|_| Ok(None));
    cache.expect_store().times(1).returning(|_| Ok(()));

    let mut sessions = MockSessions::new();
    sessions.expect_create().returning(|_| Ok(()));

    let app = app_with(cache, users, sessions, 100);
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({
                "email": "alice@example.com",
                "password": "correct horse battery",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["email"], "alice@example.com");
    assert!(!json["session"]["token"].as_str().unwrap().is_empty());
    assert!(!json["session"]["refresh_token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn wrong_password_and_unknown_email_produce_identical_errors() {
    let user = known_user("the real password", UserRole::Student);

    let mut users = MockUsers::new();
    let found = user.clone();
    users.expect_find_by_email().returning(move |email| {
        if email == "alice@example.com" {
            Ok(Some(found.clone()))
        } else {
            Ok(None)
        }
    });

    let app = app_with(MockCache::new(), users, MockSessions::new(), 100);

    let wrong_password = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "email": "alice@example.com", "password": "guess" }),
        ))
        .await
        .unwrap();
    let unknown_email = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "email": "nobody@example.com", "password": "guess" }),
        ))
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

    let first = body_json(wrong_password).await;
    let second = body_json(unknown_email).await;
    assert_eq!(first, second);
    assert_eq!(first["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_rejects_malformed_payloads_before_touching_stores() {
    let app = app_with(MockCache::new(), MockUsers::new(), MockSessions::new(), 100);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "email": "not-an-email", "password": "x" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn profile_requires_a_bearer_token() {
    let app = app_with(MockCache::new(), MockUsers::new(), MockSessions::new(), 100);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/profile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_returns_the_authenticated_user() {
    let user = known_user("irrelevant", UserRole::Instructor);
    let session = live_session(&user, "tok-profile");

    let mut cache = MockCache::new();
    cache.expect_validate().returning(|_| Ok(true));
    cache.expect_is_healthy().returning(|_| true);
    let cached = session.clone();
    cache
        .expect_get()
        .returning(move |_| Ok(Some(cached.clone())));

    let mut users = MockUsers::new();
    let found = user.clone();
    users
        .expect_find_by_id()
        .withf(move |id| *id == found.id)
        .returning({
            let user = user.clone();
            move |_| Ok(Some(user.clone()))
        });

    let mut sessions = MockSessions::new();
    let durable = session.clone();
    sessions
        .expect_get_active_for_user()
        .returning(move |_| Ok(Some(durable.clone())));

    let app = app_with(cache, users, sessions, 100);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/profile")
                .header(header::AUTHORIZATION, "Bearer tok-profile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["email"], "alice@example.com");
    assert_eq!(json["user"]["role"], "instructor");
    assert!(json["user"].get("password_hash").is_none());
    assert!(json["current_session"]["expires_at"].is_string());
}

#[tokio::test]
async fn logout_invalidates_the_cached_session() {
    let user = known_user("irrelevant", UserRole::Student);
    let session = live_session(&user, "tok-logout");

    let mut cache = MockCache::new();
    cache.expect_validate().returning(|_| Ok(true));
    cache.expect_is_healthy().returning(|_| true);
    let cached = session.clone();
    cache
        .expect_get()
        .returning(move |_| Ok(Some(cached.clone())));
    cache
        .expect_invalidate()
        .withf(move |token, user_id| token == "tok-logout" && *user_id == user.id)
        .times(1)
        .returning(|_, _| Ok(()));

    let mut sessions = MockSessions::new();
    sessions.expect_mark_revoked().returning(|_, _| Ok(()));

    let app = app_with(cache, MockUsers::new(), sessions, 100);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/logout")
                .header(header::AUTHORIZATION, "Bearer tok-logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Logged out successfully");
}

#[tokio::test]
async fn students_cannot_create_posts() {
    let user = known_user("irrelevant", UserRole::Student);
    let session = live_session(&user, "tok-student");

    let mut cache = MockCache::new();
    cache.expect_validate().returning(|_| Ok(true));
    cache.expect_is_healthy().returning(|_| true);
    let cached = session.clone();
    cache
        .expect_get()
        .returning(move |_| Ok(Some(cached.clone())));

    let app = app_with(cache, MockUsers::new(), MockSessions::new(), 100);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/posts")
                .header(header::AUTHORIZATION, "Bearer tok-student")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "title": "t", "body": "b" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn the_rate_limiter_throttles_the_whole_api_surface() {
    let app = app_with(MockCache::new(), MockUsers::new(), MockSessions::new(), 2);

    // All requests arrive from the same peer; a spoofed forwarding header
    // must not earn the client a fresh window.
    let request = |forged_ip: &str| {
        Request::builder()
            .uri("/api/v1/health")
            .header("x-real-ip", forged_ip)
            .body(Body::empty())
            .unwrap()
    };

    for n in 0..2 {
        let response = app
            .clone()
            .oneshot(request(&format!("198.51.100.{n}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let throttled = app.oneshot(request("198.51.100.99")).await.unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(throttled.headers().get("retry-after").is_some());
}
