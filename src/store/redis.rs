//! Redis backend.
//!
//! Each record is a plain string key with a millisecond expiry:
//!
//! | Operation | Command |
//! |-----------|---------|
//! | `get` | `GET key` |
//! | `insert` | `SET key value PX ttl` |
//! | `replace` | `SET key value XX PX ttl` |
//! | `delete` | `DEL key` |
//! | `ttl` | `PTTL key` |
//!
//! `SET .. XX` makes the conditional overwrite a single server-side step:
//! a record that expired between a producer's read and its write is not
//! resurrected, and readers never observe a partial value.
//!
//! A key of another Redis type under our prefix reads as absent.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tracing::{info, warn};

use super::backend::KvBackend;
use crate::error::StoreError;

/// Redis-backed [`KvBackend`].
///
/// Holds a [`MultiplexedConnection`]; clones share one TCP connection, so
/// each call clones it instead of locking.
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl RedisBackend {
    /// Connect to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    ///
    /// Fails fast if the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::unavailable("failed to create Redis client", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::unavailable("failed to connect to Redis", e))?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    /// Wrap an already established connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX rejects 0.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn is_wrong_type(err: &::redis::RedisError) -> bool {
    err.code() == Some("WRONGTYPE")
}

fn map_redis_error(err: ::redis::RedisError, key: &str) -> StoreError {
    StoreError::unavailable(format!("Redis command failed for key {key}"), err)
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        match ::redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(value) => Ok(value),
            Err(e) if is_wrong_type(&e) => {
                warn!(key, "Key holds a non-string value, treating as not found");
                Ok(None)
            }
            Err(e) => Err(map_redis_error(e, key)),
        }
    }

    async fn insert(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn replace(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<::redis::Value>(&mut conn)
            .await;
        match reply {
            Ok(reply) => Ok(!matches!(reply, ::redis::Value::Nil)),
            Err(e) if is_wrong_type(&e) => {
                warn!(key, "Key holds a non-string value, not replacing");
                Ok(false)
            }
            Err(e) => Err(map_redis_error(e, key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = ::redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        // -2: no such key, -1: no expiry (never written by this crate).
        let millis: i64 = ::redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok((millis > 0).then(|| Duration::from_millis(millis as u64)))
    }
}


/// Contract tests against a live Redis at `REDIS_URL`
/// (default `redis://127.0.0.1:6379`).
///
/// ```bash
/// cargo test --features redis-tests -- redis_
/// ```
#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;

    async fn test_backend() -> (RedisBackend, String) {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let backend = RedisBackend::connect(&url)
            .await
            .expect("Redis connection failed -- is Redis running?");
        (backend, format!("test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn redis_insert_get_delete() {
        let (backend, key) = test_backend().await;
        backend.insert(&key, "v", Duration::from_secs(30)).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("v"));
        assert!(backend.delete(&key).await.unwrap());
        assert!(backend.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redis_replace_requires_live_key() {
        let (backend, key) = test_backend().await;
        assert!(!backend.replace(&key, "v", Duration::from_secs(30)).await.unwrap());
        assert!(backend.get(&key).await.unwrap().is_none());

        backend.insert(&key, "v1", Duration::from_secs(30)).await.unwrap();
        assert!(backend.replace(&key, "v2", Duration::from_secs(30)).await.unwrap());
        assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("v2"));
        backend.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn redis_foreign_type_reads_as_absent() {
        let (backend, _) = test_backend().await;
        let id = crate::state::TaskId::new();
        let key = crate::store::make_key("test", id.as_str());
        let mut conn = backend.conn.clone();
        ::redis::cmd("HSET")
            .arg(&key)
            .arg("field")
            .arg("value")
            .query_async::<i64>(&mut conn)
            .await
            .unwrap();

        assert!(backend.get(&key).await.unwrap().is_none());

        let store = crate::store::TaskStateStore::new(
            std::sync::Arc::new(backend.clone()),
            crate::config::StoreConfig {
                key_prefix: "test".to_string(),
                ..crate::config::StoreConfig::default()
            },
        );
        assert!(store.read(&id).await.unwrap().is_none());
        assert!(!store.update(&id, crate::state::StateEvent::message("hi")).await.unwrap());
        assert!(!store.request_cancel(&id).await.unwrap());

        assert!(backend.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn redis_key_expires() {
        let (backend, key) = test_backend().await;
        backend.insert(&key, "v", Duration::from_millis(200)).await.unwrap();
        assert!(backend.ttl(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(backend.get(&key).await.unwrap().is_none());
        assert!(!backend.replace(&key, "v2", Duration::from_secs(1)).await.unwrap());
    }
}
