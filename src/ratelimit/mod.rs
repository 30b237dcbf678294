//! Rate limiting subsystem.
//!
//! Four interchangeable admission algorithms over a shared [`Store`],
//! per-request key strategies, dynamic configuration overrides, denial
//! statistics, and a tower layer for wiring the limiter into a router.
//!
//! [`Store`]: crate::store::Store

mod algorithm;
mod config;
mod key;
mod layer;
mod limiter;

pub use algorithm::{AdmissionPolicy, AdmitResult, Algorithm};
pub use config::{RateLimitConfig, RateLimitConfigBuilder, RateLimitOverride};
pub use key::{KeyStrategy, RequestContext};
pub use layer::{RateLimitLayer, RateLimitService};
pub use limiter::{Decision, RateLimitStats, RateLimiter};
