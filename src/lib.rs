//! Floodgate - HTTP API cross-cutting toolkit
//!
//! Floodgate provides two independent subsystems for Axum-based APIs:
//!
//! - **Rate limiting**: four admission algorithms (token bucket, leaky
//!   bucket, fixed window, sliding window) over a pluggable key/value store,
//!   with per-request key strategies, dynamic overrides, whitelisting,
//!   denial statistics, and a tower layer.
//! - **Marshalling**: declarative projection of source object graphs into
//!   ordered JSON responses, with scalar coercion, nested schemas,
//!   relationship cardinality, depth limiting, and cycle detection.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use floodgate::{MemoryStore, RateLimitConfig, RateLimitLayer, RateLimiter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     floodgate::init_tracing();
//!
//!     let limiter = Arc::new(RateLimiter::new(
//!         Arc::new(MemoryStore::new()),
//!         RateLimitConfig::builder().requests(100).window_seconds(60).build(),
//!     ));
//!
//!     let app: axum::Router = axum::Router::new()
//!         .route("/", axum::routing::get(|| async { "ok" }))
//!         .layer(RateLimitLayer::new(limiter));
//!     # let _ = app;
//! }
//! ```

#![allow(async_fn_in_trait)] // async_trait macro handles Send/Sync bounds properly

mod error;
pub mod marshal;
pub mod ratelimit;
pub mod store;
mod utils;

// Re-exports for public API
pub use error::{FloodgateError, Result};
pub use marshal::{
    Cardinality, Entity, EntityRef, Field, MapEntity, MarshalOptions, Resolved, Schema, marshal,
    marshal_all,
};
pub use ratelimit::{
    Algorithm, Decision, KeyStrategy, RateLimitConfig, RateLimitConfigBuilder, RateLimitLayer,
    RateLimitOverride, RateLimitStats, RateLimiter, RequestContext,
};
pub use store::{MemoryStore, Store, StoreExt};

#[cfg(feature = "redis")]
pub use store::RedisStore;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "floodgate=debug")
/// - `FLOODGATE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("FLOODGATE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
