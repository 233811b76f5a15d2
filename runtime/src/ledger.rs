//! Capacity ledger for power pools.
//!
//! Capacity is derived from the pool's eligible sources on every call; the
//! key-value mirror written by [`CapacityLedger::status`] is for dashboards
//! only and never gates an allocation.
//!
//! ```text
//! capacity  = Σ max_output_kw      (ONLINE sources)
//! output    = Σ current_output_kw  (ONLINE sources)
//! available = output − Σ allocations
//! ```
//!
//! Allocation locks the pool row for the whole read-check-write, so
//! concurrent allocators on one pool serialize and `allocated ≤ output`
//! holds under concurrency.

use futures::future::BoxFuture;
use nexus_core::collaborators::{PowerCollaborator, PowerGrant, PowerRequest, SummaryProvider};
use nexus_core::environment::Clock;
use nexus_core::ids::{PoolId, SectionId};
use nexus_core::kv::KeyValueStore;
use nexus_core::model::{
    Allocation, PowerAction, PowerLog, PowerSource, SourceStatus, SourceType,
};
use nexus_core::store::PowerStore;
use nexus_core::summary::PowerSummary;
use nexus_core::{CollaboratorError, FacilityError, Outcome, Rejection, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cache key mirroring the pool's current output.
pub const GRID_TOTAL_KEY: &str = "power:grid:total";

/// Cache key mirroring the pool's allocated amount.
pub const GRID_ALLOCATED_KEY: &str = "power:grid:allocated";

/// Tolerance for floating-point sums when checking availability.
const EPSILON_KW: f64 = 1e-9;

/// Ledger configuration.
///
/// # Default Values
///
/// - `default_pool`: `main`
/// - `default_priority`: 5
/// - `cache_ttl`: 60 seconds
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Pool used by the in-process power collaborator
    pub default_pool: PoolId,
    /// Priority given to new allocations that do not name one
    pub default_priority: i32,
    /// TTL of the dashboard mirror keys
    pub cache_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_pool: PoolId::default(),
            default_priority: 5,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

impl LedgerConfig {
    /// Set the default pool.
    #[must_use]
    pub fn default_pool(mut self, pool: PoolId) -> Self {
        self.default_pool = pool;
        self
    }

    /// Set the mirror TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// A request to add power to a consumer's allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    /// Consumer system name
    pub system: String,
    /// Amount to add in kW
    pub amount_kw: f64,
    /// Priority; keeps the existing one (or the default) when `None`
    pub priority: Option<i32>,
    /// Section served; keeps the existing one when `None`
    pub section_id: Option<SectionId>,
}

impl AllocationRequest {
    /// Request `amount_kw` for `system` with default priority.
    pub fn new(system: impl Into<String>, amount_kw: f64) -> Self {
        Self {
            system: system.into(),
            amount_kw,
            priority: None,
            section_id: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the section.
    #[must_use]
    pub fn section(mut self, section: SectionId) -> Self {
        self.section_id = Some(section);
        self
    }
}

/// One source in a [`PoolStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    /// Source id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Kind
    pub source_type: SourceType,
    /// Operating state
    pub status: SourceStatus,
    /// Rated output in kW
    pub max_output_kw: f64,
    /// Present output in kW
    pub current_output_kw: f64,
    /// `current / max × 100`
    pub utilization_percent: f64,
}

impl From<&PowerSource> for SourceReport {
    fn from(source: &PowerSource) -> Self {
        Self {
            id: source.id,
            name: source.name.clone(),
            source_type: source.source_type,
            status: source.status,
            max_output_kw: source.max_output_kw,
            current_output_kw: source.current_output_kw,
            utilization_percent: percent(source.current_output_kw, source.max_output_kw),
        }
    }
}

/// Snapshot of a pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Pool
    pub pool_id: PoolId,
    /// Σ rated output of eligible sources
    pub total_capacity_kw: f64,
    /// Σ present output of eligible sources
    pub total_output_kw: f64,
    /// Σ allocations
    pub total_allocated_kw: f64,
    /// Output minus allocations
    pub available_kw: f64,
    /// Allocations as a percentage of output
    pub utilization_percent: f64,
    /// Sources counted towards capacity
    pub online_sources: u32,
    /// All sources
    pub total_sources: u32,
    /// Per-source breakdown
    pub sources: Vec<SourceReport>,
}

impl PoolStatus {
    fn compute(pool_id: PoolId, sources: &[PowerSource], allocations: &[Allocation]) -> Self {
        let eligible = || sources.iter().filter(|s| s.is_eligible());
        let total_capacity_kw: f64 = eligible().map(|s| s.max_output_kw).sum();
        let total_output_kw: f64 = eligible().map(|s| s.current_output_kw).sum();
        let total_allocated_kw: f64 = allocations.iter().map(|a| a.amount_kw).sum();

        Self {
            pool_id,
            total_capacity_kw,
            total_output_kw,
            total_allocated_kw,
            available_kw: total_output_kw - total_allocated_kw,
            utilization_percent: percent(total_allocated_kw, total_output_kw),
            online_sources: count(eligible().count()),
            total_sources: count(sources.len()),
            sources: sources.iter().map(SourceReport::from).collect(),
        }
    }

    /// Dashboard view of this snapshot.
    #[must_use]
    pub fn summary(&self) -> PowerSummary {
        PowerSummary {
            total_capacity_kw: self.total_capacity_kw,
            total_output_kw: self.total_output_kw,
            total_allocated_kw: self.total_allocated_kw,
            available_kw: self.available_kw,
            utilization_percent: self.utilization_percent,
            online_sources: self.online_sources,
            total_sources: self.total_sources,
        }
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Capacity ledger over a [`PowerStore`].
#[derive(Clone)]
pub struct CapacityLedger {
    store: Arc<dyn PowerStore>,
    cache: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl CapacityLedger {
    /// Create a ledger.
    #[must_use]
    pub fn new(
        store: Arc<dyn PowerStore>,
        cache: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            config,
        }
    }

    /// Pool used by the in-process collaborator adapter.
    #[must_use]
    pub const fn default_pool(&self) -> &PoolId {
        &self.config.default_pool
    }

    /// Add `request.amount_kw` to the consumer's allocation in `pool`.
    ///
    /// Rejects with [`Rejection::InvalidInput`] for a non-positive or
    /// non-finite amount and with [`Rejection::InsufficientCapacity`] when
    /// the pool cannot cover it; neither mutates anything.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown pool, or a store
    /// fault.
    #[tracing::instrument(skip(self, request), fields(pool = %pool, system = %request.system))]
    pub async fn allocate(
        &self,
        pool: &PoolId,
        request: AllocationRequest,
    ) -> Result<Outcome<Allocation>> {
        if !request.amount_kw.is_finite() || request.amount_kw <= 0.0 {
            return Ok(Outcome::Rejected(Rejection::InvalidInput(format!(
                "amount must be positive, got {} kW",
                request.amount_kw
            ))));
        }

        let mut tx = self.store.begin().await?;
        if tx.lock_pool(pool.clone()).await?.is_none() {
            return Err(FacilityError::not_found("pool", pool));
        }

        let sources = tx.sources(pool.clone()).await?;
        let allocations = tx.allocations(pool.clone()).await?;
        let status = PoolStatus::compute(pool.clone(), &sources, &allocations);

        if request.amount_kw > status.available_kw + EPSILON_KW {
            tx.rollback().await?;
            tracing::warn!(
                requested_kw = request.amount_kw,
                available_kw = status.available_kw,
                "Insufficient capacity"
            );
            metrics::counter!("nexus.ledger.rejected").increment(1);
            return Ok(Outcome::Rejected(Rejection::InsufficientCapacity {
                requested_kw: request.amount_kw,
                available_kw: status.available_kw,
            }));
        }

        let now = self.clock.now();
        let allocation = match allocations.into_iter().find(|a| a.system == request.system) {
            Some(mut existing) => {
                existing.amount_kw += request.amount_kw;
                existing.priority = request.priority.unwrap_or(existing.priority);
                existing.section_id = request.section_id.or(existing.section_id);
                existing.allocated_at = now;
                existing
            }
            None => Allocation {
                pool_id: pool.clone(),
                system: request.system.clone(),
                amount_kw: request.amount_kw,
                priority: request.priority.unwrap_or(self.config.default_priority),
                section_id: request.section_id,
                allocated_at: now,
            },
        };

        tx.put_allocation(allocation.clone()).await?;
        tx.append_log(PowerLog {
            pool_id: pool.clone(),
            system: request.system,
            action: PowerAction::Allocate,
            amount_kw: request.amount_kw,
            timestamp: now,
        })
        .await?;
        tx.commit().await?;

        tracing::info!(
            amount_kw = request.amount_kw,
            total_kw = allocation.amount_kw,
            priority = allocation.priority,
            "Power allocated"
        );
        metrics::counter!("nexus.ledger.allocated").increment(1);

        Ok(Outcome::Completed(allocation))
    }

    /// Remove everything `system` holds in `pool`.
    ///
    /// Idempotent: returns `None` without error when nothing was held.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown pool, or a store
    /// fault.
    #[tracing::instrument(skip(self), fields(pool = %pool))]
    pub async fn deallocate(&self, pool: &PoolId, system: &str) -> Result<Option<Allocation>> {
        let mut tx = self.store.begin().await?;
        if tx.lock_pool(pool.clone()).await?.is_none() {
            return Err(FacilityError::not_found("pool", pool));
        }

        let Some(removed) = tx
            .delete_allocation(pool.clone(), system.to_string())
            .await?
        else {
            tx.rollback().await?;
            tracing::debug!("Nothing allocated, deallocation is a no-op");
            return Ok(None);
        };

        tx.append_log(PowerLog {
            pool_id: pool.clone(),
            system: system.to_string(),
            action: PowerAction::Deallocate,
            amount_kw: removed.amount_kw,
            timestamp: self.clock.now(),
        })
        .await?;
        tx.commit().await?;

        tracing::info!(amount_kw = removed.amount_kw, "Power deallocated");
        Ok(Some(removed))
    }

    /// Current snapshot of `pool`, mirrored into the key-value store.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown pool, or a store
    /// fault.
    pub async fn status(&self, pool: &PoolId) -> Result<PoolStatus> {
        if self.store.pool(pool).await?.is_none() {
            return Err(FacilityError::not_found("pool", pool));
        }
        let sources = self.store.sources(pool).await?;
        let allocations = self.store.allocations(pool).await?;
        let status = PoolStatus::compute(pool.clone(), &sources, &allocations);

        self.mirror(&status).await;
        Ok(status)
    }

    /// Allocations of `pool`, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn allocations(&self, pool: &PoolId) -> Result<Vec<Allocation>> {
        Ok(self.store.allocations(pool).await?)
    }

    /// Allocation held by `system` in `pool`.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn allocation(&self, pool: &PoolId, system: &str) -> Result<Option<Allocation>> {
        Ok(self
            .store
            .allocations(pool)
            .await?
            .into_iter()
            .find(|a| a.system == system))
    }

    /// Most recent ledger audit records.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn logs(&self, pool: &PoolId, limit: usize) -> Result<Vec<PowerLog>> {
        Ok(self.store.logs(pool, limit).await?)
    }

    async fn mirror(&self, status: &PoolStatus) {
        let ttl = Some(self.config.cache_ttl);
        let writes = [
            (GRID_TOTAL_KEY, status.total_output_kw),
            (GRID_ALLOCATED_KEY, status.total_allocated_kw),
        ];
        for (key, value) in writes {
            if let Err(e) = self.cache.set(key, &value.to_string(), ttl).await {
                tracing::warn!(key, error = %e, "Failed to mirror grid status");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// In-process collaborator adapters
// ═══════════════════════════════════════════════════════════════════════════

const COLLABORATOR: &str = "power";

impl PowerCollaborator for CapacityLedger {
    fn allocate(&self, request: PowerRequest) -> BoxFuture<'_, std::result::Result<PowerGrant, CollaboratorError>> {
        Box::pin(async move {
            let priority = request.priority;
            let mut ledger_request = AllocationRequest::new(request.system, request.amount_kw)
                .priority(priority);
            ledger_request.section_id = request.section_id;

            match CapacityLedger::allocate(self, &self.config.default_pool, ledger_request).await {
                Ok(Outcome::Completed(allocation)) => Ok(PowerGrant {
                    system: allocation.system,
                    allocated_kw: allocation.amount_kw,
                    priority: allocation.priority,
                }),
                Ok(Outcome::Rejected(rejection)) => Err(CollaboratorError::Rejected {
                    collaborator: COLLABORATOR.to_string(),
                    message: rejection.to_string(),
                }),
                Err(e) => Err(CollaboratorError::Unreachable {
                    collaborator: COLLABORATOR.to_string(),
                    message: e.to_string(),
                }),
            }
        })
    }

    fn deallocate<'a>(&'a self, system: &'a str) -> BoxFuture<'a, std::result::Result<(), CollaboratorError>> {
        Box::pin(async move {
            CapacityLedger::deallocate(self, &self.config.default_pool, system)
                .await
                .map(|_| ())
                .map_err(|e| CollaboratorError::Unreachable {
                    collaborator: COLLABORATOR.to_string(),
                    message: e.to_string(),
                })
        })
    }
}

impl SummaryProvider<PowerSummary> for CapacityLedger {
    fn name(&self) -> &str {
        COLLABORATOR
    }

    fn summary(&self) -> BoxFuture<'_, std::result::Result<PowerSummary, CollaboratorError>> {
        Box::pin(async move {
            self.status(&self.config.default_pool)
                .await
                .map(|status| status.summary())
                .map_err(|e| CollaboratorError::Unreachable {
                    collaborator: COLLABORATOR.to_string(),
                    message: e.to_string(),
                })
        })
    }

    fn ping(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.store.pool(&self.config.default_pool).await.is_ok() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nexus_testing::{InMemoryKeyValueStore, InMemoryStore, fixtures, test_clock};

    fn ledger(sources: &[(f64, f64)]) -> (InMemoryStore, Arc<InMemoryKeyValueStore>, CapacityLedger) {
        let store = InMemoryStore::new();
        store.insert_pool(fixtures::pool("main"));
        for (i, (max, current)) in sources.iter().enumerate() {
            store.insert_source(fixtures::online_source(
                i64::try_from(i).unwrap() + 1,
                "main",
                *max,
                *current,
            ));
        }
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let ledger = CapacityLedger::new(
            Arc::new(store.clone()),
            kv.clone(),
            Arc::new(test_clock()),
            LedgerConfig::default(),
        );
        (store, kv, ledger)
    }

    fn main_pool() -> PoolId {
        PoolId::new("main")
    }

    #[tokio::test]
    async fn last_kilowatt_is_granted_then_pool_is_exhausted() {
        let (_store, _kv, ledger) = ledger(&[(100.0, 100.0)]);
        let pool = main_pool();

        assert!(
            ledger
                .allocate(&pool, AllocationRequest::new("hydroponics", 90.0))
                .await
                .unwrap()
                .is_completed()
        );
        assert!(
            ledger
                .allocate(&pool, AllocationRequest::new("comms", 10.0))
                .await
                .unwrap()
                .is_completed()
        );
        assert_eq!(ledger.status(&pool).await.unwrap().available_kw, 0.0);

        let outcome = ledger
            .allocate(&pool, AllocationRequest::new("comms", 1.0))
            .await
            .unwrap();
        assert!(matches!(
            outcome.rejection(),
            Some(Rejection::InsufficientCapacity { requested_kw, .. }) if *requested_kw == 1.0
        ));
        assert_eq!(ledger.allocation(&pool, "comms").await.unwrap().unwrap().amount_kw, 10.0);
    }

    #[tokio::test]
    async fn reallocation_adds_to_existing_amount() {
        let (store, _kv, ledger) = ledger(&[(500.0, 400.0)]);
        let pool = main_pool();

        ledger
            .allocate(&pool, AllocationRequest::new("docking_bay_1", 50.0).priority(4))
            .await
            .unwrap();
        let outcome = ledger
            .allocate(&pool, AllocationRequest::new("docking_bay_1", 25.0))
            .await
            .unwrap();

        let allocation = outcome.into_result().unwrap();
        assert_eq!(allocation.amount_kw, 75.0);
        assert_eq!(allocation.priority, 4);
        assert_eq!(store.power_log_rows().len(), 2);
    }

    #[tokio::test]
    async fn new_allocation_uses_default_priority() {
        let (_store, _kv, ledger) = ledger(&[(100.0, 100.0)]);
        let allocation = ledger
            .allocate(&main_pool(), AllocationRequest::new("lab", 5.0))
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(allocation.priority, 5);
    }

    #[tokio::test]
    async fn non_positive_amount_is_invalid_input() {
        let (store, _kv, ledger) = ledger(&[(100.0, 100.0)]);
        for amount in [0.0, -5.0, f64::NAN] {
            let outcome = ledger
                .allocate(&main_pool(), AllocationRequest::new("lab", amount))
                .await
                .unwrap();
            assert!(outcome.rejection().unwrap().is_invalid_input());
        }
        assert!(store.power_log_rows().is_empty());
    }

    #[tokio::test]
    async fn only_online_sources_count() {
        let (store, _kv, ledger) = ledger(&[(100.0, 100.0)]);
        let mut offline = fixtures::online_source(2, "main", 1000.0, 1000.0);
        offline.status = SourceStatus::Offline;
        store.insert_source(offline);

        let status = ledger.status(&main_pool()).await.unwrap();
        assert_eq!(status.total_capacity_kw, 100.0);
        assert_eq!(status.online_sources, 1);
        assert_eq!(status.total_sources, 2);

        let outcome = ledger
            .allocate(&main_pool(), AllocationRequest::new("lab", 150.0))
            .await
            .unwrap();
        assert!(outcome.is_rejected());
    }

    #[tokio::test]
    async fn deallocate_twice_is_a_no_op() {
        let (store, _kv, ledger) = ledger(&[(100.0, 100.0)]);
        let pool = main_pool();
        ledger
            .allocate(&pool, AllocationRequest::new("lab", 30.0))
            .await
            .unwrap();

        let first = ledger.deallocate(&pool, "lab").await.unwrap();
        assert_eq!(first.unwrap().amount_kw, 30.0);
        assert!(ledger.deallocate(&pool, "lab").await.unwrap().is_none());
        assert_eq!(store.power_log_rows().len(), 2);
        assert_eq!(ledger.status(&pool).await.unwrap().total_allocated_kw, 0.0);
    }

    #[tokio::test]
    async fn unknown_pool_is_not_found() {
        let (_store, _kv, ledger) = ledger(&[]);
        let err = ledger
            .allocate(&PoolId::new("backup"), AllocationRequest::new("lab", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, FacilityError::NotFound { entity: "pool", .. }));
    }

    #[tokio::test]
    async fn concurrent_allocations_never_exceed_output() {
        let (_store, _kv, ledger) = ledger(&[(100.0, 100.0)]);
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .allocate(&main_pool(), AllocationRequest::new(format!("sys_{i}"), 10.0))
                        .await
                        .unwrap()
                        .is_completed()
                })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
        let status = ledger.status(&main_pool()).await.unwrap();
        assert!(status.total_allocated_kw <= status.total_output_kw);
    }

    #[tokio::test]
    async fn status_mirrors_totals_and_tolerates_cache_failure() {
        let (_store, kv, ledger) = ledger(&[(200.0, 150.0)]);
        let pool = main_pool();
        ledger
            .allocate(&pool, AllocationRequest::new("lab", 30.0))
            .await
            .unwrap();

        let status = ledger.status(&pool).await.unwrap();
        assert_eq!(status.utilization_percent, 20.0);
        assert_eq!(status.sources[0].utilization_percent, 75.0);
        assert_eq!(kv.value(GRID_TOTAL_KEY).as_deref(), Some("150"));
        assert_eq!(kv.value(GRID_ALLOCATED_KEY).as_deref(), Some("30"));

        kv.set_failing(true);
        assert!(ledger.status(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn collaborator_adapter_reports_rejection() {
        let (_store, _kv, ledger) = ledger(&[(10.0, 10.0)]);
        let power: &dyn PowerCollaborator = &ledger;

        let grant = power
            .allocate(PowerRequest {
                system: "docking_bay_1".to_string(),
                amount_kw: 8.0,
                section_id: None,
                priority: 4,
            })
            .await
            .unwrap();
        assert_eq!(grant.allocated_kw, 8.0);

        let err = power
            .allocate(PowerRequest {
                system: "docking_bay_2".to_string(),
                amount_kw: 8.0,
                section_id: None,
                priority: 4,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected { .. }));

        power.deallocate("docking_bay_1").await.unwrap();
        power.deallocate("docking_bay_1").await.unwrap();
    }
}
