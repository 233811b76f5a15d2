//! Redis key-value store for the Nexus coordination core.
//!
//! [`RedisKeyValueStore`] implements both [`KeyValueStore`] and
//! [`KeyExpirySource`]:
//!
//! - `set_if_absent` is `SET key value NX PX ttl`
//! - `delete_if_equals` is a Lua compare-and-delete, executed atomically
//!   on the server
//! - expiry events come from a pattern subscription to
//!   `__keyevent@*__:expired`
//!
//! Keyspace notifications are off by default in Redis. The store enables
//! them (`notify-keyspace-events Ex`) when subscribing; managed instances
//! that refuse `CONFIG SET` must have it configured out of band.
//!
//! # Example
//!
//! ```no_run
//! use nexus_core::kv::KeyValueStore;
//! use nexus_redis::RedisKeyValueStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = RedisKeyValueStore::new("redis://127.0.0.1:6379").await?;
//! kv.set_if_absent("init:lock:docking", "token", Duration::from_secs(300)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::StreamExt;
use futures::future::BoxFuture;
use nexus_core::KvError;
use nexus_core::kv::{ExpiredKeys, KeyExpirySource, KeyValueStore};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Channel pattern of expiry events across all databases.
pub const EXPIRED_PATTERN: &str = "__keyevent@*__:expired";

const COMPARE_AND_DELETE: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
";

fn command_err(e: &redis::RedisError) -> KvError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        KvError::Connection(e.to_string())
    } else {
        KvError::Command(e.to_string())
    }
}

fn millis(ttl: Duration) -> u64 {
    // Redis rejects a zero PX.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// `Redis`-backed key-value store.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    /// Client used to open dedicated pub/sub connections.
    client: Client,
    /// Connection manager for commands.
    conn_manager: ConnectionManager,
}

impl RedisKeyValueStore {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Connection`] if the server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, KvError> {
        let client = Client::open(redis_url)
            .map_err(|e| KvError::Connection(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            KvError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            client,
            conn_manager,
        })
    }

    async fn enable_expiry_notifications(&self) {
        let mut conn = self.conn_manager.clone();
        let reply: Result<(), redis::RedisError> = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await;
        if let Err(e) = reply {
            tracing::warn!(error = %e, "Could not enable keyspace notifications, relying on server config");
        }
    }
}

impl KeyValueStore for RedisKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, KvError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(key).await.map_err(|e| command_err(&e))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<(), KvError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            let _: () = cmd.query_async(&mut conn).await.map_err(|e| command_err(&e))?;
            Ok(())
        })
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| command_err(&e))?;
            Ok(reply.is_some())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: i64 = conn.del(key).await.map_err(|e| command_err(&e))?;
            Ok(removed > 0)
        })
    }

    fn delete_if_equals<'a>(
        &'a self,
        key: &'a str,
        expected: &'a str,
    ) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: i64 = redis::Script::new(COMPARE_AND_DELETE)
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| command_err(&e))?;
            Ok(removed > 0)
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.exists(key).await.map_err(|e| command_err(&e))
        })
    }
}

impl KeyExpirySource for RedisKeyValueStore {
    fn expired_keys(&self) -> BoxFuture<'_, Result<ExpiredKeys, KvError>> {
        Box::pin(async move {
            self.enable_expiry_notifications().await;

            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .map_err(|e| KvError::Subscription(format!("Failed to open pub/sub connection: {e}")))?;
            pubsub
                .psubscribe(EXPIRED_PATTERN)
                .await
                .map_err(|e| KvError::Subscription(format!("Failed to subscribe to {EXPIRED_PATTERN}: {e}")))?;

            tracing::info!(pattern = EXPIRED_PATTERN, "Subscribed to key expiry events");

            let keys = pubsub.into_on_message().filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(key) => Some(key),
                    Err(e) => {
                        tracing::warn!(error = %e, "Unreadable expiry event");
                        None
                    }
                }
            });
            Ok(keys.boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_runtime::mutex::DistributedMutex;
    use std::sync::Arc;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[test]
    fn ttl_is_never_zero_millis() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(30)), 30_000);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn compare_and_delete_only_removes_own_value() {
        let kv = RedisKeyValueStore::new(REDIS_URL)
            .await
            .expect("Failed to create store");
        let key = "test:nexus:cad";
        kv.delete(key).await.unwrap();

        assert!(kv.set_if_absent(key, "a", Duration::from_secs(5)).await.unwrap());
        assert!(!kv.set_if_absent(key, "b", Duration::from_secs(5)).await.unwrap());
        assert!(!kv.delete_if_equals(key, "b").await.unwrap());
        assert_eq!(kv.get(key).await.unwrap().as_deref(), Some("a"));
        assert!(kv.delete_if_equals(key, "a").await.unwrap());
        assert!(!kv.exists(key).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn stale_holder_cannot_release_new_lock() {
        let kv = Arc::new(
            RedisKeyValueStore::new(REDIS_URL)
                .await
                .expect("Failed to create store"),
        );
        let mutex = DistributedMutex::new(kv.clone());
        let key = "test:nexus:mutex";
        kv.delete(key).await.unwrap();

        let first = mutex
            .acquire(key, Duration::from_millis(200))
            .await
            .unwrap()
            .expect("first acquire");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let second = mutex
            .acquire(key, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("second acquire");
        assert!(!mutex.release(key, &first).await.unwrap());
        assert!(mutex.is_held(key).await.unwrap());
        assert!(mutex.release(key, &second).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    async fn expiry_is_delivered_to_subscribers() {
        let kv = RedisKeyValueStore::new(REDIS_URL)
            .await
            .expect("Failed to create store");
        let mut expired = kv.expired_keys().await.unwrap();

        kv.set("test:nexus:expiring", "pending", Some(Duration::from_millis(100)))
            .await
            .unwrap();

        let key = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match expired.next().await {
                    Some(key) if key == "test:nexus:expiring" => break key,
                    Some(_) => {}
                    None => panic!("subscription closed"),
                }
            }
        })
        .await
        .expect("no expiry event");
        assert_eq!(key, "test:nexus:expiring");
    }
}
