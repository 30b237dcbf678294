//! Redis-backed store.
//!
//! Atomicity for the increment-plus-expire sequence comes from a MULTI/EXEC
//! pipeline. Every operation is fail-open: transport errors are logged and
//! reported as an absent key (reads) or swallowed (writes), never raised.

use crate::store::Store;
use async_trait::async_trait;
use std::time::Duration;

/// Redis store for deployments sharing one limit across processes.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Create a new Redis store from a connection URL.
    pub fn new(url: &str) -> crate::error::Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            crate::error::FloodgateError::internal(format!("failed to create Redis client: {}", e))
        })?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "failed to get Redis connection, failing open");
                None
            }
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.connection().await?;

        match redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET failed, treating key as absent");
                None
            }
        }
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }

        if let Err(e) = cmd.query_async::<()>(&mut conn).await {
            tracing::warn!(key = %key, error = %e, "Redis SET failed, dropping write");
        }
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Option<i64> {
        let mut conn = self.connection().await?;

        let result = if let Some(ttl) = ttl {
            // INCR and PEXPIRE must land in one transaction so the TTL is
            // reapplied even when the key already existed.
            redis::pipe()
                .atomic()
                .cmd("INCR")
                .arg(key)
                .cmd("PEXPIRE")
                .arg(key)
                .arg(ttl.as_millis().max(1) as u64)
                .ignore()
                .query_async::<(i64,)>(&mut conn)
                .await
                .map(|(count,)| count)
        } else {
            redis::cmd("INCR")
                .arg(key)
                .query_async::<i64>(&mut conn)
                .await
        };

        match result {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis INCR failed, failing open");
                None
            }
        }
    }

    async fn delete(&self, key: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        if let Err(e) = redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await {
            tracing::warn!(key = %key, error = %e, "Redis DEL failed");
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        let Some(mut conn) = self.connection().await else {
            return 0;
        };

        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let scan = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .await;

            let (next, keys) = match scan {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(prefix = %prefix, error = %e, "Redis SCAN failed");
                    return removed;
                }
            };

            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                for key in &keys {
                    del.arg(key);
                }
                match del.query_async::<i64>(&mut conn).await {
                    Ok(count) => removed += count as usize,
                    Err(e) => tracing::warn!(error = %e, "Redis DEL failed during bulk reset"),
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        removed
    }

    fn is_healthy(&self) -> bool {
        self.client.get_connection().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreExt;

    // These tests require a running Redis instance and are ignored by default.

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_store_roundtrip() {
        let store = RedisStore::new("redis://127.0.0.1/").unwrap();

        store.set("floodgate_test_key", &"value", None).await;
        let value: Option<String> = store.get("floodgate_test_key").await;
        assert_eq!(value, Some("value".to_string()));

        store.delete("floodgate_test_key").await;
        assert!(store.get_bytes("floodgate_test_key").await.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_incr_with_ttl() {
        let store = RedisStore::new("redis://127.0.0.1/").unwrap();
        store.delete("floodgate_test_counter").await;

        assert_eq!(
            store
                .incr("floodgate_test_counter", Some(Duration::from_secs(5)))
                .await,
            Some(1)
        );
        assert_eq!(
            store
                .incr("floodgate_test_counter", Some(Duration::from_secs(5)))
                .await,
            Some(2)
        );

        store.delete("floodgate_test_counter").await;
    }

    #[test]
    fn test_unreachable_backend_fails_open() {
        // Client creation only parses the URL, no connection is made yet.
        let store = RedisStore::new("redis://127.0.0.1:1/").unwrap();

        tokio::runtime::Runtime::new().unwrap().block_on(async {
            assert!(store.get_bytes("any").await.is_none());
            assert_eq!(store.incr("any", None).await, None);
            store.set_bytes("any", vec![1], None).await;
            store.delete("any").await;
        });
    }
}
