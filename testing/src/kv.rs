//! In-memory key-value store with TTLs and expiry notifications.

use futures::future::BoxFuture;
use nexus_core::KvError;
use nexus_core::kv::{ExpiredKeys, KeyExpirySource, KeyValueStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    failing: bool,
}

/// In-memory stand-in for Redis.
///
/// TTLs are measured with `tokio::time`, so tests can run with a paused
/// clock and `tokio::time::advance`. Keys whose TTL has passed are removed
/// lazily on access, by [`expire_due`](Self::expire_due), or immediately by
/// [`expire_now`](Self::expire_now). Each removal by expiry is published to
/// [`KeyExpirySource`] subscribers, like Redis keyspace notifications.
///
/// # Example
///
/// ```
/// use nexus_core::kv::KeyValueStore;
/// use nexus_testing::kv::InMemoryKeyValueStore;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let kv = InMemoryKeyValueStore::new();
/// assert!(kv.set_if_absent("k", "a", Duration::from_secs(5)).await.unwrap());
/// assert!(!kv.set_if_absent("k", "b", Duration::from_secs(5)).await.unwrap());
/// kv.expire_now("k");
/// assert!(!kv.exists("k").await.unwrap());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryKeyValueStore {
    inner: Arc<Mutex<Inner>>,
    events: Arc<Mutex<Option<broadcast::Sender<String>>>>,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Make every command fail with [`KvError::Connection`] until reset.
    pub fn set_failing(&self, failing: bool) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing = failing;
    }

    /// Current value of a live key, without triggering expiry.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone())
    }

    /// Remaining TTL of a live key.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .filter(|at| *at > now)
            .map(|at| at - now)
    }

    /// Expire `key` immediately, publishing an expiry event if it existed.
    pub fn expire_now(&self, key: &str) -> bool {
        let removed = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(key)
            .is_some();
        if removed {
            self.publish(key);
        }
        removed
    }

    /// Remove every key whose TTL has passed and publish their expiry.
    pub fn expire_due(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let keys: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                inner.entries.remove(key);
            }
            keys
        };
        for key in &expired {
            self.publish(key);
        }
        expired
    }

    /// End every expiry subscription, as if the connection dropped.
    ///
    /// Later calls to [`expired_keys`](KeyExpirySource::expired_keys) open a
    /// fresh subscription, like a reconnect.
    pub fn close_subscriptions(&self) {
        let (sender, _) = broadcast::channel(256);
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }

    /// Refuse new expiry subscriptions until reopened.
    pub fn refuse_subscriptions(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Number of live expiry subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn publish(&self, key: &str) {
        if let Some(sender) = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            // No subscribers is fine.
            let _ = sender.send(key.to_string());
        }
    }

    /// Run `f` against live entries, expiring stale ones first.
    fn with_entries<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> T,
    ) -> Result<T, KvError> {
        let (result, expired) = {
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| KvError::Command("Mutex lock failed".into()))?;
            if inner.failing {
                return Err(KvError::Connection("connection refused".into()));
            }
            let now = Instant::now();
            let expired = inner
                .entries
                .get(key)
                .is_some_and(|e| e.is_expired(now));
            if expired {
                inner.entries.remove(key);
            }
            (f(&mut inner.entries), expired)
        };
        if expired {
            self.publish(key);
        }
        Ok(result)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|ttl| Instant::now() + ttl)
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, KvError>> {
        Box::pin(async move {
            self.with_entries(key, |entries| entries.get(key).map(|e| e.value.clone()))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<(), KvError>> {
        Box::pin(async move {
            self.with_entries(key, |entries| {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_string(),
                        expires_at: deadline(ttl),
                    },
                );
            })
        })
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move {
            self.with_entries(key, |entries| {
                if entries.contains_key(key) {
                    return false;
                }
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_string(),
                        expires_at: deadline(Some(ttl)),
                    },
                );
                true
            })
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move { self.with_entries(key, |entries| entries.remove(key).is_some()) })
    }

    fn delete_if_equals<'a>(
        &'a self,
        key: &'a str,
        expected: &'a str,
    ) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move {
            self.with_entries(key, |entries| {
                if entries.get(key).is_some_and(|e| e.value == expected) {
                    entries.remove(key);
                    true
                } else {
                    false
                }
            })
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, KvError>> {
        Box::pin(async move { self.with_entries(key, |entries| entries.contains_key(key)) })
    }
}

impl KeyExpirySource for InMemoryKeyValueStore {
    fn expired_keys(&self) -> BoxFuture<'_, Result<ExpiredKeys, KvError>> {
        Box::pin(async move {
            let mut receiver = self
                .events
                .lock()
                .map_err(|_| KvError::Subscription("Mutex lock failed".into()))?
                .as_ref()
                .map(broadcast::Sender::subscribe)
                .ok_or_else(|| KvError::Subscription("subscriptions closed".into()))?;

            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(key) => yield key,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };

            Ok(Box::pin(stream) as ExpiredKeys)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn delete_if_equals_checks_value() {
        let kv = InMemoryKeyValueStore::new();
        kv.set("k", "owner-a", None).await.unwrap();

        assert!(!kv.delete_if_equals("k", "owner-b").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("owner-a"));
        assert!(kv.delete_if_equals("k", "owner-a").await.unwrap());
        assert!(!kv.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_publishes_event() {
        let kv = InMemoryKeyValueStore::new();
        let mut events = kv.expired_keys().await.unwrap();

        kv.set("ship:return:1", "pending", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(kv.ttl("ship:return:1").is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(kv.expire_due(), vec!["ship:return:1".to_string()]);
        assert_eq!(events.next().await.as_deref(), Some("ship:return:1"));
    }

    #[tokio::test]
    async fn closing_ends_subscriptions() {
        let kv = InMemoryKeyValueStore::new();
        let mut events = kv.expired_keys().await.unwrap();
        assert_eq!(kv.subscriber_count(), 1);
        kv.close_subscriptions();
        assert!(events.next().await.is_none());
        assert_eq!(kv.subscriber_count(), 0);

        let mut reopened = kv.expired_keys().await.unwrap();
        kv.set("k", "v", None).await.unwrap();
        assert!(kv.expire_now("k"));
        assert_eq!(reopened.next().await.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn refused_subscriptions_error() {
        let kv = InMemoryKeyValueStore::new();
        kv.refuse_subscriptions();
        assert!(kv.expired_keys().await.is_err());
    }

    #[tokio::test]
    async fn failing_store_reports_connection_error() {
        let kv = InMemoryKeyValueStore::new();
        kv.set_failing(true);
        assert!(matches!(
            kv.get("k").await,
            Err(KvError::Connection(_))
        ));
    }
}
