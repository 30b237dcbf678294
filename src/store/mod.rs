//! Key/value storage backends for rate limiting state.
//!
//! Provides a thread-safe in-memory store by default, with optional Redis
//! support via the `redis` feature. Storage operations are deliberately
//! fail-open: a read failure on the remote backend looks like an absent key
//! and a write failure is dropped, because denying all traffic on an infra
//! blip is worse than a temporary bypass.

mod memory;

#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

/// Key/value store with expiry and atomic increment.
///
/// All operations are atomic with respect to concurrent callers sharing the
/// same instance. Correctness of admission decisions rests on these
/// guarantees, not on any locking in the rate limiter itself.
///
/// Transport failures never surface as errors: reads report the key as
/// absent, writes are silently dropped.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the raw bytes stored under `key`.
    ///
    /// Returns `None` if the key is missing, expired, or the backend is
    /// unreachable. An expired key behaves exactly as if it were deleted.
    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>>;

    /// Store raw bytes under `key`, optionally expiring after `ttl`.
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>);

    /// Atomically increment the integer at `key`, creating it at 1 if absent.
    ///
    /// When `ttl` is given it is (re)applied to the key even if the key
    /// already existed, as part of the same logical transaction as the
    /// increment. Returns `None` only on backend transport failure.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Option<i64>;

    /// Delete the key if present.
    async fn delete(&self, key: &str);

    /// Delete every key starting with `prefix`, returning how many were
    /// removed. Used by the administrative bulk-reset operation.
    async fn delete_prefix(&self, prefix: &str) -> usize;

    /// Check if the backend is reachable.
    fn is_healthy(&self) -> bool;
}

/// Helper trait for typed store operations.
///
/// Values are stored as JSON. Bytes that fail to deserialize read back as
/// absent, which is what lets malformed dynamic configuration fall back to
/// static defaults without erroring.
pub trait StoreExt: Store {
    /// Get and deserialize a value.
    async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.get_bytes(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "discarding undecodable stored value");
                None
            }
        }
    }

    /// Serialize and store a value.
    async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
    where
        T: serde::Serialize + Sync,
    {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_bytes(key, bytes, ttl).await,
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to serialize value for store"),
        }
    }
}

// Blanket implementation - all Store implementations get StoreExt for free
impl<T: Store + ?Sized> StoreExt for T {}
