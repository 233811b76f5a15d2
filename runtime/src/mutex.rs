//! Cluster-wide mutual exclusion over the shared key-value store.
//!
//! A lock is a key holding a random owner token with a TTL:
//!
//! - `acquire` is an atomic set-if-absent with expiry
//! - `release` is an atomic compare-and-delete on the token
//!
//! The TTL bounds how long a crashed holder blocks others. The token check
//! on release stops an instance whose lock already expired from deleting a
//! lock that another instance has since acquired.
//!
//! # Example
//!
//! ```ignore
//! let mutex = DistributedMutex::new(kv);
//! if let Some(token) = mutex.acquire("ship:return:lock:7", Duration::from_secs(30)).await? {
//!     // critical section
//!     mutex.release("ship:return:lock:7", &token).await?;
//! }
//! ```

use nexus_core::kv::KeyValueStore;
use nexus_core::{FacilityError, KvError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ownership proof returned by a successful acquire.
#[derive(Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Token value as stored in the key-value store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are capabilities; keep them out of logs.
        f.write_str("LockToken(..)")
    }
}

/// How long to keep trying for a contended lock.
///
/// # Default Values
///
/// - `wait`: 30 seconds
/// - `poll`: 500ms
#[derive(Debug, Clone, Copy)]
pub struct LockWait {
    /// Give up after this long
    pub wait: Duration,
    /// Pause between attempts
    pub poll: Duration,
}

impl Default for LockWait {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(30),
            poll: Duration::from_millis(500),
        }
    }
}

impl LockWait {
    /// Set the overall wait.
    #[must_use]
    pub const fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the polling interval.
    #[must_use]
    pub const fn poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

/// Default TTL of an initialization lock.
pub const INIT_LOCK_TTL: Duration = Duration::from_secs(300);

/// Key of the initialization lock for `service`.
#[must_use]
pub fn init_lock_key(service: &str) -> String {
    format!("init:lock:{service}")
}

/// Distributed mutex backed by a [`KeyValueStore`].
#[derive(Clone)]
pub struct DistributedMutex {
    store: Arc<dyn KeyValueStore>,
}

impl DistributedMutex {
    /// Create a mutex over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Try once to take `key` for `ttl`.
    ///
    /// Returns `None` if another owner holds the key.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the store cannot be reached. Callers that must
    /// fail closed treat this like `None`.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, KvError> {
        let token = LockToken::generate();
        let acquired = self.store.set_if_absent(key, token.as_str(), ttl).await?;

        if acquired {
            tracing::debug!(key, ttl_ms = ttl.as_millis(), "Lock acquired");
            Ok(Some(token))
        } else {
            tracing::debug!(key, "Lock held by another owner");
            Ok(None)
        }
    }

    /// Release `key` if `token` still owns it.
    ///
    /// Returns `false` when the lock expired and was taken by someone else
    /// (or simply expired); that is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the store cannot be reached.
    pub async fn release(&self, key: &str, token: &LockToken) -> Result<bool, KvError> {
        let released = self.store.delete_if_equals(key, token.as_str()).await?;

        if released {
            tracing::debug!(key, "Lock released");
        } else {
            tracing::debug!(key, "Lock not released, no longer the owner");
        }

        Ok(released)
    }

    /// Whether anyone currently holds `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the store cannot be reached.
    pub async fn is_held(&self, key: &str) -> Result<bool, KvError> {
        self.store.exists(key).await
    }

    /// Poll [`acquire`](Self::acquire) until it succeeds or `policy.wait`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::LockTimeout`] when the wait runs out, or
    /// [`FacilityError::KeyValue`] if the store fails.
    pub async fn acquire_within(
        &self,
        key: &str,
        ttl: Duration,
        policy: LockWait,
    ) -> Result<LockToken, FacilityError> {
        let deadline = tokio::time::Instant::now() + policy.wait;

        loop {
            if let Some(token) = self.acquire(key, ttl).await? {
                return Ok(token);
            }

            if tokio::time::Instant::now() + policy.poll > deadline {
                tracing::warn!(key, wait_ms = policy.wait.as_millis(), "Timed out waiting for lock");
                metrics::counter!("nexus.mutex.timeout").increment(1);
                return Err(FacilityError::LockTimeout {
                    key: key.to_string(),
                });
            }

            tokio::time::sleep(policy.poll).await;
        }
    }

    /// Run `init` on exactly one replica.
    ///
    /// Takes the `init:lock:{service}` lock. If another replica holds it, the
    /// initialization is already under way elsewhere and `None` is returned
    /// without running `init`. Otherwise `init` runs and the lock is released
    /// afterwards whatever `init` returned.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the lock cannot be attempted.
    pub async fn run_once<F, Fut, T>(
        &self,
        service: &str,
        ttl: Duration,
        init: F,
    ) -> Result<Option<T>, KvError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        let key = init_lock_key(service);

        let Some(token) = self.acquire(&key, ttl).await? else {
            tracing::info!(service, "Initialization running on another instance, skipping");
            return Ok(None);
        };

        tracing::info!(service, "Running initialization");
        let result = init().await;

        if let Err(e) = self.release(&key, &token).await {
            tracing::warn!(service, error = %e, "Failed to release initialization lock");
        }

        Ok(Some(result))
    }
}
