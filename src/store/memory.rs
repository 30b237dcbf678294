//! In-memory store guarded by a mutex.
//!
//! Each logical operation holds the lock for its whole read-modify-write
//! sequence, so concurrent increments on the same key can never both observe
//! stale pre-increment state. Expiry is lazy: an expired entry is removed the
//! next time it is read.

use crate::store::Store;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Thread-safe in-memory key/value store with lazy expiry.
///
/// Suitable for single-process deployments and tests. Multi-process
/// deployments sharing one limit should use [`RedisStore`](crate::store::RedisStore).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry. Exposed for test teardown.
    pub fn clear(&self) {
        self.inner.lock().expect("store lock poisoned").clear();
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut table = self.inner.lock().expect("store lock poisoned");
        table.retain(|_, entry| !entry.expired(now));
        table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut table = self.inner.lock().expect("store lock poisoned");
        match table.get(key) {
            Some(entry) if entry.expired(now) => {
                table.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        let mut table = self.inner.lock().expect("store lock poisoned");
        table.insert(key.to_string(), Entry { value, expires_at });
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Option<i64> {
        let now = Instant::now();
        let mut table = self.inner.lock().expect("store lock poisoned");

        let current = match table.get(key) {
            Some(entry) if entry.expired(now) => 0,
            Some(entry) => serde_json::from_slice::<i64>(&entry.value).unwrap_or(0),
            None => 0,
        };
        let next = current + 1;

        // TTL is (re)applied even for an existing key, inside the same lock
        // section as the increment.
        let expires_at = ttl.map(|d| now + d);
        table.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Some(next)
    }

    async fn delete(&self, key: &str) {
        self.inner.lock().expect("store lock poisoned").remove(key);
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        let mut table = self.inner.lock().expect("store lock poisoned");
        let before = table.len();
        table.retain(|key, _| !key.starts_with(prefix));
        before - table.len()
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
