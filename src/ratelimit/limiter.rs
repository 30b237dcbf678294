//! Rate limiter orchestration.
//!
//! Computes the limiting key, applies whitelist bypass, resolves dynamic
//! overrides from the shared store, runs the configured algorithm and turns
//! the outcome into standard rate-limit headers. The orchestrator itself
//! takes no locks around admission; correctness under concurrency comes from
//! the store's atomicity guarantees.

use crate::ratelimit::algorithm::{AdmissionPolicy, Algorithm};
use crate::ratelimit::config::{RateLimitConfig, RateLimitOverride};
use crate::ratelimit::key::{KeyStrategy, RequestContext};
use crate::store::{Store, StoreExt};
use crate::utils::unix_now;
use axum::{
    Json,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";
const HEADER_RETRY_AFTER: &str = "retry-after";

/// Outcome of one orchestrated admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    /// Whitelisted key or fail-open path: the request proceeds without any
    /// rate-limit headers.
    pub bypassed: bool,
    pub limit: u32,
    pub remaining: f64,
    pub reset_at: f64,
    /// Seconds the client should wait before retrying; set on denial only.
    pub retry_after: Option<u64>,
}

impl Decision {
    fn bypass() -> Self {
        Self {
            allowed: true,
            bypassed: true,
            limit: 0,
            remaining: 0.0,
            reset_at: 0.0,
            retry_after: None,
        }
    }

    /// The standard rate-limit headers for this decision. Empty when the
    /// check was bypassed.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        if self.bypassed {
            return Vec::new();
        }
        let mut headers = vec![
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, (self.remaining.round().max(0.0) as i64).to_string()),
            (HEADER_RESET, (self.reset_at as i64).to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            headers.push((HEADER_RETRY_AFTER, retry_after.to_string()));
        }
        headers
    }

    /// Merge this decision's headers into an existing header map.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        for (name, value) in self.headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }
    }
}

/// Per-key denial statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    /// Denials since the key was last reset.
    pub total: i64,
    /// Denials in the current minute bucket.
    pub per_minute: i64,
    /// Denials in the current hour bucket.
    pub per_hour: i64,
}

/// The rate limiter orchestrator.
///
/// Constructed once at startup and shared by reference; all mutable state
/// lives in the store or behind the config lock, so checks from concurrent
/// workers are safe.
pub struct RateLimiter {
    store: Arc<dyn Store>,
    config: RwLock<RateLimitConfig>,
    key_strategy: KeyStrategy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config: RwLock::new(config),
            key_strategy: KeyStrategy::Ip,
        }
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Snapshot of the current default configuration.
    pub fn config(&self) -> RateLimitConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Replace the default configuration. Exposed as an administrative
    /// operation; takes effect for subsequent checks.
    pub fn update_config(&self, config: RateLimitConfig) {
        *self.config.write().expect("config lock poisoned") = config;
    }

    /// Run an admission check for the request described by `ctx`.
    pub async fn check(&self, ctx: &RequestContext) -> Decision {
        self.check_at(ctx, unix_now()).await
    }

    /// Time-injectable variant of [`check`](Self::check).
    pub async fn check_at(&self, ctx: &RequestContext, now: f64) -> Decision {
        let config = self.config();
        if !config.enabled {
            return Decision::bypass();
        }

        let key = self.key_strategy.key(ctx);
        if config.whitelist.iter().any(|entry| entry == &key) {
            return Decision::bypass();
        }

        let (requests, window, algorithm_name) = self.resolve_limits(&config, ctx).await;

        let Some(algorithm) = Algorithm::parse(&algorithm_name) else {
            // Unknown algorithm is a misconfiguration, not a reason to take
            // the service down: execute unprotected.
            tracing::warn!(algorithm = %algorithm_name, "unknown rate limit algorithm, failing open");
            return Decision::bypass();
        };

        let policy = AdmissionPolicy::new(algorithm, requests, window);
        let result = policy.allow_at(&*self.store, &key, now).await;

        let retry_after = if result.allowed {
            None
        } else {
            Some(((result.reset_at - now).ceil() as i64).max(1) as u64)
        };

        if !result.allowed && config.enable_stats {
            self.record_denial(&key, now).await;
        }

        Decision {
            allowed: result.allowed,
            bypassed: false,
            limit: requests,
            remaining: result.remaining,
            reset_at: result.reset_at,
            retry_after,
        }
    }

    /// Wrap a protected operation: denial short-circuits with a 429 response
    /// and never invokes `op`; success runs `op` and merges the rate-limit
    /// headers into whatever response shape it produced.
    pub async fn protect<F, Fut, R>(&self, ctx: &RequestContext, op: F) -> Response
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
        R: IntoResponse,
    {
        let decision = self.check(ctx).await;
        Self::respond(decision, op).await
    }

    /// Like [`protect`](Self::protect), but with an explicit per-call policy
    /// instead of the configured defaults. Whitelisting and statistics still
    /// apply; dynamic overrides do not, since the caller pinned the limits.
    pub async fn protect_with<F, Fut, R>(
        &self,
        ctx: &RequestContext,
        policy: AdmissionPolicy,
        op: F,
    ) -> Response
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
        R: IntoResponse,
    {
        let config = self.config();
        let now = unix_now();

        let decision = if !config.enabled {
            Decision::bypass()
        } else {
            let key = self.key_strategy.key(ctx);
            if config.whitelist.iter().any(|entry| entry == &key) {
                Decision::bypass()
            } else {
                let result = policy.allow_at(&*self.store, &key, now).await;
                let retry_after = if result.allowed {
                    None
                } else {
                    Some(((result.reset_at - now).ceil() as i64).max(1) as u64)
                };
                if !result.allowed && config.enable_stats {
                    self.record_denial(&key, now).await;
                }
                Decision {
                    allowed: result.allowed,
                    bypassed: false,
                    limit: policy.requests,
                    remaining: result.remaining,
                    reset_at: result.reset_at,
                    retry_after,
                }
            }
        };

        Self::respond(decision, op).await
    }

    async fn respond<F, Fut, R>(decision: Decision, op: F) -> Response
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
        R: IntoResponse,
    {
        if !decision.allowed {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "message": "Too Many Requests",
                    "error": "rate limit exceeded",
                })),
            )
                .into_response();
            decision.apply_headers(response.headers_mut());
            return response;
        }

        let mut response = op().await.into_response();
        decision.apply_headers(response.headers_mut());
        response
    }

    /// Resolve effective limits: endpoint-scoped override first, then the
    /// global override, then the static defaults.
    async fn resolve_limits(
        &self,
        config: &RateLimitConfig,
        ctx: &RequestContext,
    ) -> (u32, u64, String) {
        let mut requests = config.requests;
        let mut window = config.window_seconds;
        let mut algorithm = config.algorithm.clone();

        let endpoint_override = match &ctx.endpoint {
            Some(endpoint) => {
                self.store
                    .get::<RateLimitOverride>(&RateLimitOverride::endpoint_key(endpoint))
                    .await
            }
            None => None,
        };
        let dynamic = match endpoint_override {
            Some(ov) => Some(ov),
            None => {
                self.store
                    .get::<RateLimitOverride>(RateLimitOverride::global_key())
                    .await
            }
        };

        if let Some(ov) = dynamic {
            if let Some(r) = ov.requests {
                requests = r;
            }
            if let Some(w) = ov.window_seconds {
                window = w;
            }
            if let Some(a) = ov.algorithm {
                algorithm = a;
            }
        }

        (requests, window, algorithm)
    }

    fn stats_keys(key: &str, now: f64) -> (String, String, String) {
        let minute = (now / 60.0) as u64;
        let hour = (now / 3600.0) as u64;
        (
            format!("ratelimit:stats:{}", key),
            format!("ratelimit:stats:{}:m{}", key, minute),
            format!("ratelimit:stats:{}:h{}", key, hour),
        )
    }

    async fn record_denial(&self, key: &str, now: f64) {
        let (total_key, minute_key, hour_key) = Self::stats_keys(key, now);
        self.store.incr(&total_key, None).await;
        self.store
            .incr(&minute_key, Some(Duration::from_secs(60)))
            .await;
        self.store
            .incr(&hour_key, Some(Duration::from_secs(3600)))
            .await;
    }

    /// Denial statistics for a key.
    pub async fn stats(&self, key: &str) -> RateLimitStats {
        self.stats_at(key, unix_now()).await
    }

    /// Time-injectable variant of [`stats`](Self::stats).
    pub async fn stats_at(&self, key: &str, now: f64) -> RateLimitStats {
        let (total_key, minute_key, hour_key) = Self::stats_keys(key, now);
        RateLimitStats {
            total: self.store.get::<i64>(&total_key).await.unwrap_or(0),
            per_minute: self.store.get::<i64>(&minute_key).await.unwrap_or(0),
            per_hour: self.store.get::<i64>(&hour_key).await.unwrap_or(0),
        }
    }

    /// Zero the denial statistics for a key.
    pub async fn reset_stats(&self, key: &str) {
        self.store
            .delete_prefix(&format!("ratelimit:stats:{}", key))
            .await;
    }

    /// Bulk-reset rate limit state for every key starting with
    /// `key_prefix`, across all algorithm namespaces. Returns the number of
    /// store entries removed.
    pub async fn reset(&self, key_prefix: &str) -> usize {
        let mut removed = 0;
        for namespace in ["token_bucket", "leaky_bucket", "fixed_window", "sliding_window"] {
            removed += self
                .store
                .delete_prefix(&format!("{}:{}", namespace, key_prefix))
                .await;
        }
        removed
    }
}
