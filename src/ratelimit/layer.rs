//! Tower middleware gating requests through a shared [`RateLimiter`].
//!
//! The service builds a [`RequestContext`] from the incoming request, runs
//! the admission check, and either forwards to the inner service (merging
//! the rate-limit headers into its response) or short-circuits with a 429.

use crate::ratelimit::key::RequestContext;
use crate::ratelimit::limiter::RateLimiter;
use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};

/// Tower layer for rate limiting.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Tower service for rate limiting.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request> + Clone + Send + Sync + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Health check endpoints are never rate limited.
        let path = req.uri().path();
        if path == "/health" || path.starts_with("/health/") {
            let mut svc = self.inner.clone();
            return Box::pin(async move {
                let response = svc.call(req).await?;
                Ok(response.into_response())
            });
        }

        let ctx = context_from_request(&req, self.limiter.config().trust_proxy);
        let limiter = self.limiter.clone();
        let mut svc = self.inner.clone();

        Box::pin(async move {
            let decision = limiter.check(&ctx).await;

            if !decision.allowed {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    axum::Json(serde_json::json!({
                        "message": "Too Many Requests",
                        "error": "rate limit exceeded",
                    })),
                )
                    .into_response();
                decision.apply_headers(response.headers_mut());
                return Ok(response);
            }

            let mut response = svc.call(req).await?.into_response();
            decision.apply_headers(response.headers_mut());
            Ok(response)
        })
    }
}

/// Build the limiting context for a request.
///
/// An upstream middleware (authentication, routing) may insert a prepared
/// [`RequestContext`] into the request extensions; it wins over header
/// inspection. Otherwise the context carries the client IP and the request
/// path as the endpoint.
fn context_from_request(req: &Request, trust_proxy: bool) -> RequestContext {
    if let Some(ctx) = req.extensions().get::<RequestContext>() {
        return ctx.clone();
    }

    let mut ctx = RequestContext::new().with_endpoint(req.uri().path());
    if let Some(ip) = client_ip(req, trust_proxy) {
        ctx = ctx.with_remote_addr(ip);
    }
    ctx
}

/// Extract the client IP from a request.
///
/// SECURITY: proxy headers are only consulted when `trust_proxy` is set.
/// Trusting X-Forwarded-For without a proxy that overwrites it lets clients
/// spoof their IP and bypass per-IP limits.
fn client_ip(req: &Request, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        // X-Forwarded-For may contain multiple IPs: "client, proxy1, proxy2".
        // The leftmost is the original client.
        req.headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                req.headers()
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            })
            .or_else(|| connect_info_ip(req))
    } else {
        connect_info_ip(req)
    }
}

fn connect_info_ip(req: &Request) -> Option<String> {
    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|addr| addr.ip().to_string())
}
