//! Integration tests for the rate limiting layer.
//!
//! These tests drive a real axum router through the tower layer and verify
//! the complete request/response cycle: admission, denial, headers, health
//! check bypass, and proxy-header key isolation.

use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
use floodgate::{MemoryStore, RateLimitConfig, RateLimitLayer, RateLimiter};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn app(config: RateLimitConfig) -> Router {
    let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryStore::new()), config));
    Router::new()
        .route("/widgets", get(|| async { "widgets" }))
        .route("/health", get(|| async { "ok" }))
        .layer(RateLimitLayer::new(limiter))
}

fn request(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_requests_over_capacity_get_429() {
    let app = app(RateLimitConfig::builder()
        .requests(2)
        .window_seconds(60)
        .build());

    for _ in 0..2 {
        let response = app.clone().oneshot(request("/widgets")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let denied = app.clone().oneshot(request("/widgets")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.headers().contains_key("retry-after"));

    let body = denied.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["message"], "Too Many Requests");
    assert_eq!(json["error"], "rate limit exceeded");
}

#[tokio::test]
async fn test_allowed_response_carries_rate_limit_headers() {
    let app = app(RateLimitConfig::builder()
        .requests(5)
        .window_seconds(60)
        .build());

    let response = app.clone().oneshot(request("/widgets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
    assert!(response.headers().contains_key("x-ratelimit-reset"));
    assert!(!response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn test_health_endpoint_is_never_limited() {
    let app = app(RateLimitConfig::builder()
        .requests(1)
        .window_seconds(60)
        .build());

    for _ in 0..10 {
        let response = app.clone().oneshot(request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_whitelisted_key_is_never_limited() {
    // With no connection info the limiting key falls back to "unknown".
    let app = app(RateLimitConfig::builder()
        .requests(1)
        .window_seconds(60)
        .whitelist("unknown")
        .build());

    for _ in 0..10 {
        let response = app.clone().oneshot(request("/widgets")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Bypassed requests get no rate-limit headers.
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_trusted_proxy_header_scopes_limits_per_client() {
    let app = app(RateLimitConfig::builder()
        .requests(1)
        .window_seconds(60)
        .trust_proxy(true)
        .build());

    let from = |ip: &str| {
        Request::builder()
            .uri("/widgets")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(
        app.clone().oneshot(from("203.0.113.7")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone().oneshot(from("203.0.113.7")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    // A different client still has its own quota.
    assert_eq!(
        app.clone().oneshot(from("198.51.100.4")).await.unwrap().status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_spoofed_proxy_header_is_ignored_by_default() {
    let app = app(RateLimitConfig::builder()
        .requests(1)
        .window_seconds(60)
        .build());

    let from = |ip: &str| {
        Request::builder()
            .uri("/widgets")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    // Without trust_proxy every request maps to the same fallback key, so
    // rotating the header does not buy extra quota.
    assert_eq!(
        app.clone().oneshot(from("1.1.1.1")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone().oneshot(from("2.2.2.2")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_disabled_limiter_passes_everything_through() {
    let app = app(RateLimitConfig::builder()
        .enabled(false)
        .requests(1)
        .build());

    for _ in 0..10 {
        let response = app.clone().oneshot(request("/widgets")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}
