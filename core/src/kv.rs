//! External key-value store port.
//!
//! The key-value store holds everything that must outlive a single
//! service instance but has no natural relational row: mutex records,
//! scheduled-transition timers and read-only dashboard mirrors.
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so the store can
//! be shared as `Arc<dyn KeyValueStore>` between services.

use crate::error::KvError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::time::Duration;

/// Stream of keys the store has expired.
pub type ExpiredKeys = BoxStream<'static, String>;

/// Key-value operations the coordination layer relies on.
pub trait KeyValueStore: Send + Sync {
    /// Read a key.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the store cannot be reached.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, KvError>>;

    /// Write a key, replacing any previous value. `ttl` of `None` keeps the
    /// key until deleted.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the write fails.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<(), KvError>>;

    /// Atomically write `key` only if it does not exist, with an expiry.
    ///
    /// Returns `true` if this call created the key.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the command fails.
    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, KvError>>;

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the command fails.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, KvError>>;

    /// Atomically delete `key` only if its value equals `expected`.
    ///
    /// Returns `true` if the key was deleted. Implementations must perform
    /// the comparison and the deletion as one indivisible step.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the command fails.
    fn delete_if_equals<'a>(
        &'a self,
        key: &'a str,
        expected: &'a str,
    ) -> BoxFuture<'a, Result<bool, KvError>>;

    /// Whether a key exists.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the command fails.
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool, KvError>>;
}

/// Source of key-expiry notifications.
pub trait KeyExpirySource: Send + Sync {
    /// Subscribe to expiry events. Each item is the expired key.
    ///
    /// The stream ends when the underlying subscription is lost.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Subscription`] if the subscription cannot be set up.
    fn expired_keys(&self) -> BoxFuture<'_, Result<ExpiredKeys, KvError>>;
}
