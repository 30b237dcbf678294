//! Rate limiting algorithms.
//!
//! Four interchangeable strategies over the same storage contract, each a
//! function of (key, time) -> admit/deny plus remaining quota and reset time.
//! State lives in the store under a per-algorithm namespace with TTL equal to
//! the window, so idle keys expire on their own.
//!
//! Boundary semantics differ on purpose: token bucket, leaky bucket and
//! sliding window deny the exactly-at-capacity request (strict `<`), while
//! fixed window admits up to and including the capacity (`<=`).

use crate::store::{Store, StoreExt};
use crate::utils::unix_now;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The closed set of rate limiting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    TokenBucket,
    LeakyBucket,
    FixedWindow,
    SlidingWindow,
}

impl Algorithm {
    /// Map a configuration string to a strategy. Unknown names yield `None`
    /// so the caller can fail open instead of crashing on a misconfiguration.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "token_bucket" => Some(Self::TokenBucket),
            "leaky_bucket" => Some(Self::LeakyBucket),
            "fixed_window" => Some(Self::FixedWindow),
            "sliding_window" => Some(Self::SlidingWindow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::LeakyBucket => "leaky_bucket",
            Self::FixedWindow => "fixed_window",
            Self::SlidingWindow => "sliding_window",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmitResult {
    pub allowed: bool,
    /// Remaining quota after this check. Fractional for the bucket
    /// algorithms, integral for the window-based ones.
    pub remaining: f64,
    /// Unix timestamp at which the quota is expected to be fully restored.
    pub reset_at: f64,
}

#[derive(Serialize, Deserialize)]
struct BucketState {
    tokens: f64,
    last_refill: f64,
}

#[derive(Serialize, Deserialize)]
struct LeakState {
    level: f64,
    last_leak: f64,
}

/// A strategy bound to its capacity and window.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub algorithm: Algorithm,
    pub requests: u32,
    pub window_seconds: u64,
}

impl AdmissionPolicy {
    pub fn new(algorithm: Algorithm, requests: u32, window_seconds: u64) -> Self {
        Self {
            algorithm,
            requests: requests.max(1),
            window_seconds: window_seconds.max(1),
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.requests)
    }

    fn window(&self) -> f64 {
        self.window_seconds as f64
    }

    /// Tokens granted (or drained) per second.
    fn rate(&self) -> f64 {
        self.capacity() / self.window()
    }

    fn ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.window_seconds))
    }

    /// Check whether a request under `key` is admitted right now.
    pub async fn allow(&self, store: &dyn Store, key: &str) -> AdmitResult {
        self.allow_at(store, key, unix_now()).await
    }

    /// Time-injectable variant of [`allow`](Self::allow).
    pub async fn allow_at(&self, store: &dyn Store, key: &str, now: f64) -> AdmitResult {
        match self.algorithm {
            Algorithm::TokenBucket => self.allow_token_bucket(store, key, now).await,
            Algorithm::LeakyBucket => self.allow_leaky_bucket(store, key, now).await,
            Algorithm::FixedWindow => self.allow_fixed_window(store, key, now).await,
            Algorithm::SlidingWindow => self.allow_sliding_window(store, key, now).await,
        }
    }

    async fn allow_token_bucket(&self, store: &dyn Store, key: &str, now: f64) -> AdmitResult {
        let state_key = format!("token_bucket:{}", key);
        let mut state = store.get::<BucketState>(&state_key).await.unwrap_or(BucketState {
            tokens: self.capacity(),
            last_refill: now,
        });

        let elapsed = now - state.last_refill;
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.rate()).min(self.capacity());
            state.last_refill = now;
        }

        let allowed = state.tokens >= 1.0;
        if allowed {
            state.tokens -= 1.0;
        }

        let remaining = state.tokens;
        // Approximate full-refill estimate, not exact to the token.
        let reset_at = state.last_refill + self.window();
        store.set(&state_key, &state, self.ttl()).await;

        AdmitResult {
            allowed,
            remaining,
            reset_at,
        }
    }

    async fn allow_leaky_bucket(&self, store: &dyn Store, key: &str, now: f64) -> AdmitResult {
        let state_key = format!("leaky_bucket:{}", key);
        let mut state = store.get::<LeakState>(&state_key).await.unwrap_or(LeakState {
            level: 0.0,
            last_leak: now,
        });

        let elapsed = now - state.last_leak;
        if elapsed > 0.0 {
            state.level = (state.level - elapsed * self.rate()).max(0.0);
            state.last_leak = now;
        }

        let allowed = state.level < self.capacity();
        if allowed {
            state.level += 1.0;
        }

        let remaining = self.capacity() - state.level;
        let reset_at = state.last_leak + self.window();
        store.set(&state_key, &state, self.ttl()).await;

        AdmitResult {
            allowed,
            remaining,
            reset_at,
        }
    }

    async fn allow_fixed_window(&self, store: &dyn Store, key: &str, now: f64) -> AdmitResult {
        let window = self.window_seconds;
        let now_secs = now as u64;
        let window_start = now_secs - now_secs % window;
        let state_key = format!("fixed_window:{}:{}", key, window_start);
        let reset_at = (window_start + window) as f64;

        match store.incr(&state_key, self.ttl()).await {
            Some(count) => {
                let allowed = count <= i64::from(self.requests);
                let remaining = (i64::from(self.requests) - count).max(0) as f64;
                AdmitResult {
                    allowed,
                    remaining,
                    reset_at,
                }
            }
            // Backend unreachable: fail open.
            None => AdmitResult {
                allowed: true,
                remaining: self.capacity() - 1.0,
                reset_at,
            },
        }
    }

    async fn allow_sliding_window(&self, store: &dyn Store, key: &str, now: f64) -> AdmitResult {
        let state_key = format!("sliding_window:{}", key);
        let mut log = store.get::<Vec<f64>>(&state_key).await.unwrap_or_default();

        // Lazily purge entries that slid out of the window.
        let window_start = now - self.window();
        log.retain(|&t| t > window_start);

        let allowed = (log.len() as u32) < self.requests;
        if allowed {
            log.push(now);
        }

        let remaining = (i64::from(self.requests) - log.len() as i64).max(0) as f64;
        let reset_at = now + self.window();
        store.set(&state_key, &log, self.ttl()).await;

        AdmitResult {
            allowed,
            remaining,
            reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const T0: f64 = 1_700_000_000.0;

    fn policy(algorithm: Algorithm, requests: u32, window: u64) -> AdmissionPolicy {
        AdmissionPolicy::new(algorithm, requests, window)
    }

    #[test]
    fn test_parse_known_algorithms() {
        assert_eq!(Algorithm::parse("token_bucket"), Some(Algorithm::TokenBucket));
        assert_eq!(Algorithm::parse("leaky_bucket"), Some(Algorithm::LeakyBucket));
        assert_eq!(Algorithm::parse("fixed_window"), Some(Algorithm::FixedWindow));
        assert_eq!(Algorithm::parse("sliding_window"), Some(Algorithm::SlidingWindow));
        assert_eq!(Algorithm::parse("gcra"), None);
    }

    #[tokio::test]
    async fn test_token_bucket_burst_then_deny() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::TokenBucket, 2, 60);

        let first = policy.allow_at(&store, "k", T0).await;
        assert!(first.allowed);
        let second = policy.allow_at(&store, "k", T0).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0.0);

        let third = policy.allow_at(&store, "k", T0).await;
        assert!(!third.allowed);
        assert!(third.reset_at - T0 >= 1.0);
    }

    #[tokio::test]
    async fn test_token_bucket_refills_one_token_per_interval() {
        let store = MemoryStore::new();
        // 2 requests / 2 seconds: one token per second.
        let policy = policy(Algorithm::TokenBucket, 2, 2);

        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        assert!(!policy.allow_at(&store, "k", T0).await.allowed);

        // Not enough elapsed time for a whole token.
        assert!(!policy.allow_at(&store, "k", T0 + 0.5).await.allowed);
        // One interval later exactly one request is admitted.
        assert!(policy.allow_at(&store, "k", T0 + 1.5).await.allowed);
        assert!(!policy.allow_at(&store, "k", T0 + 1.5).await.allowed);
    }

    #[tokio::test]
    async fn test_token_bucket_refill_caps_at_capacity() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::TokenBucket, 2, 2);

        policy.allow_at(&store, "k", T0).await;
        policy.allow_at(&store, "k", T0).await;
        let result = policy.allow_at(&store, "k", T0 + 3.0).await;
        assert!(result.allowed);
        // Refill capped at capacity, then one token consumed.
        assert_eq!(result.remaining, 1.0);
    }

    #[tokio::test]
    async fn test_leaky_bucket_denies_at_capacity() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::LeakyBucket, 3, 60);

        for _ in 0..3 {
            assert!(policy.allow_at(&store, "k", T0).await.allowed);
        }
        let denied = policy.allow_at(&store, "k", T0).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0.0);
    }

    #[tokio::test]
    async fn test_leaky_bucket_drains_over_time() {
        let store = MemoryStore::new();
        // 2 requests / 2 seconds: drains one per second.
        let policy = policy(Algorithm::LeakyBucket, 2, 2);

        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        assert!(!policy.allow_at(&store, "k", T0).await.allowed);

        // After one second the level dropped below capacity again.
        assert!(policy.allow_at(&store, "k", T0 + 1.5).await.allowed);
    }

    #[tokio::test]
    async fn test_fixed_window_admits_up_to_and_including_capacity() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::FixedWindow, 3, 60);

        for _ in 0..3 {
            assert!(policy.allow_at(&store, "k", T0).await.allowed);
        }
        assert!(!policy.allow_at(&store, "k", T0).await.allowed);
    }

    #[tokio::test]
    async fn test_fixed_window_resets_at_boundary() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::FixedWindow, 2, 60);

        let window_start = ((T0 as u64) - (T0 as u64) % 60) as f64;
        let in_window = window_start + 1.0;

        assert!(policy.allow_at(&store, "k", in_window).await.allowed);
        assert!(policy.allow_at(&store, "k", in_window).await.allowed);
        assert!(!policy.allow_at(&store, "k", in_window).await.allowed);

        // First request of the next window succeeds even though the prior
        // window was exhausted.
        let next_window = window_start + 60.0 + 0.5;
        let result = policy.allow_at(&store, "k", next_window).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 1.0);
    }

    #[tokio::test]
    async fn test_fixed_window_reset_time() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::FixedWindow, 2, 60);

        let window_start = ((T0 as u64) - (T0 as u64) % 60) as f64;
        let result = policy.allow_at(&store, "k", window_start + 5.0).await;
        assert_eq!(result.reset_at, window_start + 60.0);
    }

    #[tokio::test]
    async fn test_sliding_window_burst_then_deny() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::SlidingWindow, 2, 60);

        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        let third = policy.allow_at(&store, "k", T0).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0.0);
    }

    #[tokio::test]
    async fn test_sliding_window_purges_expired_entries() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::SlidingWindow, 2, 10);

        assert!(policy.allow_at(&store, "k", T0).await.allowed);
        assert!(policy.allow_at(&store, "k", T0 + 1.0).await.allowed);
        assert!(!policy.allow_at(&store, "k", T0 + 2.0).await.allowed);

        // The first timestamp slid out of the 10s window.
        assert!(policy.allow_at(&store, "k", T0 + 10.5).await.allowed);
    }

    #[tokio::test]
    async fn test_sliding_window_spans_fixed_boundaries() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::SlidingWindow, 2, 10);

        // Two admissions near the end of a would-be fixed window still count
        // against a request shortly after it.
        assert!(policy.allow_at(&store, "k", T0 + 8.0).await.allowed);
        assert!(policy.allow_at(&store, "k", T0 + 9.0).await.allowed);
        assert!(!policy.allow_at(&store, "k", T0 + 11.0).await.allowed);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let store = MemoryStore::new();
        let policy = policy(Algorithm::TokenBucket, 1, 60);

        assert!(policy.allow_at(&store, "a", T0).await.allowed);
        assert!(!policy.allow_at(&store, "a", T0).await.allowed);
        assert!(policy.allow_at(&store, "b", T0).await.allowed);
    }

    #[tokio::test]
    async fn test_concurrent_fixed_window_admits_exactly_capacity() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let store = Arc::new(MemoryStore::new());
        let policy = policy(Algorithm::FixedWindow, 5, 60);
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..20 {
            let store = store.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                let result = policy.allow_at(&*store, "k", T0).await;
                if result.allowed {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Atomic increment in the store makes this exact, not approximate.
        assert_eq!(admitted.load(Ordering::SeqCst), 5);
    }
}
