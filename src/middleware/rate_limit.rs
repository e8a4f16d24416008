//! Admission control applied before any authentication or session work.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use axum::middleware::Next;
use axum::response::Response as AxumResponse;

use crate::services::FixedWindowRateLimiter;

/// Client key for admission control: the peer address, always. Forwarding
/// headers such as `X-Real-IP` are client-controlled; trusting them would
/// let a flooder reset its window by rotating the header.
fn client_key(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<FixedWindowRateLimiter>>,
    request: Request,
    next: Next,
) -> AxumResponse {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let Some(key) = client_key(&request) else {
        return json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "rate_limit_key_error",
            "Unable to determine request identity.",
            None,
        );
    };

    let (permitted, retry_after) = limiter.allow(&key);
    if !permitted {
        tracing::warn!(client = %key, "Rate limit exceeded");
        return json_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "Too many requests. Please try again later.",
            Some(retry_after),
        );
    }

    next.run(request).await
}

fn json_error_response(
    status: StatusCode,
    error: &str,
    message: &str,
    retry_after: Option<Duration>,
) -> Response<Body> {
    // Retry-After carries whole seconds; round up so the client never
    // retries inside the closed window.
    let retry_after_secs = retry_after.map(|d| d.as_secs_f64().ceil().max(1.0) as u64);

    let mut body = serde_json::json!({
        "error": error,
        "message": message,
    });
    if let Some(secs) = retry_after_secs {
        body["retry_after"] = secs.into();
    }

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(secs) = retry_after_secs {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Extension, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn limiter(limit: u32, window_secs: u64, enabled: bool) -> Arc<FixedWindowRateLimiter> {
        Arc::new(FixedWindowRateLimiter::new(
            limit,
            Duration::from_secs(window_secs),
            enabled,
        ))
    }

    fn app(limiter: Arc<FixedWindowRateLimiter>, peer: SocketAddr) -> Router {
        Router::new()
            .route("/limited", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(limiter, rate_limit))
            .layer(Extension(ConnectInfo(peer)))
    }

    fn peer(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([10, 1, 1, last_octet], 40000))
    }

    fn request() -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri("/limited")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn rejects_excess_requests_with_retry_after_header() {
        let app = app(limiter(1, 60, true), peer(1));

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get("retry-after").is_some());

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "rate_limit_exceeded");
        assert!(json["retry_after"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn different_peers_do_not_share_a_window() {
        let limiter = limiter(1, 60, true);

        let first = app(limiter.clone(), peer(1))
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let other = app(limiter, peer(2)).oneshot(request()).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forged_forwarding_headers_do_not_open_a_fresh_window() {
        let app = app(limiter(1, 60, true), peer(1));

        for n in 0..20u32 {
            let response = app
                .clone()
                .oneshot(
                    axum::http::Request::builder()
                        .uri("/limited")
                        .header("x-real-ip", format!("203.0.113.{n}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let expected = if n == 0 {
                StatusCode::OK
            } else {
                StatusCode::TOO_MANY_REQUESTS
            };
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn missing_client_identity_is_an_internal_error() {
        // No connect-info layer, so the peer address cannot be resolved.
        let app = Router::new()
            .route("/limited", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(
                limiter(5, 60, true),
                rate_limit,
            ));
        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn disabled_limiter_passes_requests_without_a_client_key() {
        let app = Router::new()
            .route("/limited", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(
                limiter(1, 60, false),
                rate_limit,
            ));

        for _ in 0..3 {
            let response = app.clone().oneshot(request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
