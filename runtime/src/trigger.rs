//! TTL-driven return of departed ships.
//!
//! Undocking writes a schedule key `ship:return:{id}` with a TTL and no
//! payload. Existence means "pending"; expiry means "fire". Expiry
//! notifications are delivered to every replica, so each handler first takes
//! the per-ship lock `ship:return:lock:{id}` and only the winner runs the
//! transition.
//!
//! Delivery is at-most-once. The schedule key is gone by the time the event
//! arrives, so a transition that fails after the lock is taken is lost; it is
//! logged at `error` and counted as `nexus.trigger.lost`.

use crate::mutex::DistributedMutex;
use futures::StreamExt;
use nexus_core::environment::Clock;
use nexus_core::ids::ShipId;
use nexus_core::kv::{ExpiredKeys, KeyExpirySource, KeyValueStore};
use nexus_core::model::{DockingAction, NewDockingLog, ShipStatus};
use nexus_core::store::DockingStore;
use nexus_core::{KvError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Prefix of schedule keys.
pub const RETURN_KEY_PREFIX: &str = "ship:return:";

/// Prefix of per-ship dispatch locks.
pub const RETURN_LOCK_PREFIX: &str = "ship:return:lock:";

const PENDING: &str = "pending";

/// Schedule key for `ship`.
#[must_use]
pub fn return_key(ship: ShipId) -> String {
    format!("{RETURN_KEY_PREFIX}{ship}")
}

/// Dispatch lock key for `ship`.
#[must_use]
pub fn return_lock_key(ship: ShipId) -> String {
    format!("{RETURN_LOCK_PREFIX}{ship}")
}

/// Trigger configuration.
///
/// # Default Values
///
/// - `lock_ttl`: 30 seconds
/// - `resubscribe_initial_delay`: 100ms
/// - `resubscribe_max_delay`: 30 seconds
#[derive(Debug, Clone, Copy)]
pub struct TriggerConfig {
    /// TTL of the dispatch lock
    pub lock_ttl: Duration,
    /// Wait before the first resubscribe attempt
    pub resubscribe_initial_delay: Duration,
    /// Cap for the doubling resubscribe wait
    pub resubscribe_max_delay: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            resubscribe_initial_delay: Duration::from_millis(100),
            resubscribe_max_delay: Duration::from_secs(30),
        }
    }
}

impl TriggerConfig {
    /// Set the dispatch lock TTL.
    #[must_use]
    pub const fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the resubscribe backoff bounds.
    #[must_use]
    pub const fn resubscribe_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.resubscribe_initial_delay = initial;
        self.resubscribe_max_delay = max;
        self
    }

    /// Wait before resubscribe attempt `attempt`, doubling from the initial
    /// delay and capped at the maximum.
    #[must_use]
    pub fn resubscribe_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.resubscribe_initial_delay
            .saturating_mul(factor)
            .min(self.resubscribe_max_delay)
    }
}

/// What happened to one expiry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Not a schedule key
    Ignored,
    /// Another replica holds the dispatch lock, or the lock store failed
    Skipped,
    /// Ship moved to `INCOMING`
    Transitioned(ShipId),
    /// Ship missing or no longer `DEPARTING`; nothing changed
    NotApplicable(ShipId),
    /// Transition failed after the lock was taken; the event is lost
    Failed(ShipId),
}

/// Scheduled transition trigger for ship returns.
pub struct TransitionTrigger {
    kv: Arc<dyn KeyValueStore>,
    mutex: DistributedMutex,
    store: Arc<dyn DockingStore>,
    clock: Arc<dyn Clock>,
    config: TriggerConfig,
}

impl TransitionTrigger {
    /// Create a trigger.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn DockingStore>,
        clock: Arc<dyn Clock>,
        config: TriggerConfig,
    ) -> Self {
        Self {
            mutex: DistributedMutex::new(Arc::clone(&kv)),
            kv,
            store,
            clock,
            config,
        }
    }

    /// Schedule the return of `ship` after `delay`.
    ///
    /// Scheduling again replaces the pending timer.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the key cannot be written.
    pub async fn schedule(&self, ship: ShipId, delay: Duration) -> std::result::Result<(), KvError> {
        self.kv.set(&return_key(ship), PENDING, Some(delay)).await?;
        tracing::info!(ship_id = %ship, delay_secs = delay.as_secs(), "Return scheduled");
        Ok(())
    }

    /// Whether a return is pending for `ship`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the store cannot be reached.
    pub async fn is_pending(&self, ship: ShipId) -> std::result::Result<bool, KvError> {
        self.kv.exists(&return_key(ship)).await
    }

    /// Handle one expired key.
    pub async fn handle_expired(&self, key: &str) -> TriggerOutcome {
        if key.starts_with(RETURN_LOCK_PREFIX) {
            return TriggerOutcome::Ignored;
        }
        let Some(raw) = key.strip_prefix(RETURN_KEY_PREFIX) else {
            return TriggerOutcome::Ignored;
        };
        let ship = match raw.parse::<ShipId>() {
            Ok(ship) => ship,
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring return key with invalid ship id");
                return TriggerOutcome::Ignored;
            }
        };

        let lock_key = return_lock_key(ship);
        let token = match self.mutex.acquire(&lock_key, self.config.lock_ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(ship_id = %ship, "Return handled by another instance");
                return TriggerOutcome::Skipped;
            }
            Err(e) => {
                tracing::warn!(ship_id = %ship, error = %e, "Could not take dispatch lock, skipping");
                return TriggerOutcome::Skipped;
            }
        };

        let result = self.return_ship(ship).await;

        if let Err(e) = self.mutex.release(&lock_key, &token).await {
            tracing::warn!(ship_id = %ship, error = %e, "Failed to release dispatch lock");
        }

        match result {
            Ok(true) => {
                metrics::counter!("nexus.trigger.fired").increment(1);
                TriggerOutcome::Transitioned(ship)
            }
            Ok(false) => TriggerOutcome::NotApplicable(ship),
            Err(e) => {
                tracing::error!(ship_id = %ship, error = %e, "Return transition failed, event lost");
                metrics::counter!("nexus.trigger.lost").increment(1);
                TriggerOutcome::Failed(ship)
            }
        }
    }

    /// Move a departing ship back to `INCOMING`.
    async fn return_ship(&self, ship_id: ShipId) -> Result<bool> {
        let mut tx = self.store.begin().await?;

        let Some(mut ship) = tx.ship_for_update(ship_id).await? else {
            tx.rollback().await?;
            tracing::warn!(ship_id = %ship_id, "Ship to return no longer exists");
            return Ok(false);
        };

        if ship.status != ShipStatus::Departing {
            tx.rollback().await?;
            tracing::info!(ship_id = %ship_id, status = %ship.status, "Ship not departing, return skipped");
            return Ok(false);
        }

        ship.status = ShipStatus::Incoming;
        ship.departure_time = None;
        let details = format!("Ship {} returning", ship.name);
        tx.update_ship(ship).await?;
        tx.append_log(NewDockingLog {
            ship_id,
            bay_id: None,
            action: DockingAction::ArrivalScheduled,
            timestamp: self.clock.now(),
            details,
        })
        .await?;
        tx.commit().await?;

        tracing::info!(ship_id = %ship_id, "Ship returning");
        Ok(true)
    }

    /// Handle every event of `events`, each in its own task.
    ///
    /// Returns once the stream ends and every in-flight handler finished.
    pub async fn run(self: Arc<Self>, mut events: ExpiredKeys) {
        let mut handlers = JoinSet::new();

        while let Some(key) = events.next().await {
            let trigger = Arc::clone(&self);
            handlers.spawn(async move { trigger.handle_expired(&key).await });
            while handlers.try_join_next().is_some() {}
        }

        while handlers.join_next().await.is_some() {}
        tracing::info!("Expiry subscription ended");
    }

    /// Subscribe to `source` and [`run`](Self::run) until `shutdown`
    /// changes or its sender is dropped.
    ///
    /// A lost or refused subscription is retried with exponential backoff.
    /// The backoff resets once a subscription is established.
    pub async fn listen(
        self: Arc<Self>,
        source: Arc<dyn KeyExpirySource>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            match source.expired_keys().await {
                Ok(events) => {
                    attempt = 0;
                    tracing::info!("Listening for return timers");
                    tokio::select! {
                        () = Arc::clone(&self).run(events) => {
                            tracing::warn!("Return timer subscription lost, resubscribing");
                            metrics::counter!("nexus.trigger.resubscribed").increment(1);
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Could not subscribe to return timers");
                    attempt = attempt.saturating_add(1);
                }
            }

            let delay = self.config.resubscribe_delay(attempt);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Return timer listener stopped");
    }
}
