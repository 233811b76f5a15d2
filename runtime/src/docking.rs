//! Docking orchestrator.
//!
//! Binds bay assignment, power allocation and crew notification:
//!
//! ```text
//! dock:   lock ship ─► lock first AVAILABLE bay ─► allocate power ─► commit ─► notify crew
//!                                    │                    │
//!                                    └ NoBayAvailable     └ PowerAllocationFailed (nothing to undo)
//!
//! undock: lock ship ─► lock occupied bay ─► notify crew, release power ─► commit ─► schedule return
//!                              │                  (fire-and-forget)
//!                              └ DataInconsistency
//! ```
//!
//! Power is requested before any local write, so a failed allocation needs
//! no compensation. Ship and bay rows stay locked from the first read until
//! commit; the bay search skips rows locked by concurrent docks.

use crate::trigger::TransitionTrigger;
use futures::future::BoxFuture;
use nexus_core::collaborators::{CrewCollaborator, PowerCollaborator, PowerRequest, SummaryProvider};
use nexus_core::environment::Clock;
use nexus_core::ids::{BayId, ShipId};
use nexus_core::kv::KeyValueStore;
use nexus_core::model::{
    Bay, BayStatus, DockingAction, DockingLog, NewDockingLog, NewShip, Ship, ShipStatus, ShipType,
};
use nexus_core::store::{DockingStore, DockingTx, StoreResult};
use nexus_core::summary::DockingSummary;
use nexus_core::{CollaboratorError, DateTime, FacilityError, Outcome, Rejection, Result, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cache key mirroring the number of available bays.
pub const AVAILABLE_BAYS_KEY: &str = "docking:bays:available";

/// Power consumer name of a bay.
#[must_use]
pub fn bay_system(bay: BayId) -> String {
    format!("docking_bay_{bay}")
}

/// Orchestrator configuration.
///
/// # Default Values
///
/// - `power_per_bay_kw`: 50.0
/// - `power_priority`: 4
/// - `return_delay`: 60 seconds
/// - `cache_ttl`: 60 seconds
/// - `delivery_crew`: 5
/// - `delivery_cargo_capacity`: 2000
#[derive(Debug, Clone, Copy)]
pub struct DockingConfig {
    /// Power requested for an occupied bay
    pub power_per_bay_kw: f64,
    /// Priority of bay power
    pub power_priority: i32,
    /// Delay between undock and the ship's return
    pub return_delay: Duration,
    /// TTL of the available-bay mirror
    pub cache_ttl: Duration,
    /// Crew aboard a scheduled delivery
    pub delivery_crew: i32,
    /// Cargo capacity of a scheduled delivery
    pub delivery_cargo_capacity: i32,
}

impl Default for DockingConfig {
    fn default() -> Self {
        Self {
            power_per_bay_kw: 50.0,
            power_priority: 4,
            return_delay: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(60),
            delivery_crew: 5,
            delivery_cargo_capacity: 2000,
        }
    }
}

impl DockingConfig {
    /// Set the power requested per bay.
    #[must_use]
    pub const fn power_per_bay_kw(mut self, kw: f64) -> Self {
        self.power_per_bay_kw = kw;
        self
    }

    /// Set the return delay.
    #[must_use]
    pub const fn return_delay(mut self, delay: Duration) -> Self {
        self.return_delay = delay;
        self
    }
}

/// Dependencies of the orchestrator.
#[derive(Clone)]
pub struct DockingEnvironment {
    /// Bays, ships and audit records
    pub store: Arc<dyn DockingStore>,
    /// Power service
    pub power: Arc<dyn PowerCollaborator>,
    /// Crew service
    pub crew: Arc<dyn CrewCollaborator>,
    /// Return scheduler
    pub trigger: Arc<TransitionTrigger>,
    /// Dashboard mirror
    pub cache: Arc<dyn KeyValueStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Result of a successful dock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingReceipt {
    /// Ship docked
    pub ship_id: ShipId,
    /// Bay assigned
    pub bay_id: BayId,
    /// Power granted to the bay in kW
    pub allocated_kw: f64,
}

/// Result of a successful undock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndockReceipt {
    /// Ship undocked
    pub ship_id: ShipId,
    /// Bay freed
    pub bay_id: BayId,
    /// Whether the return timer was written
    pub return_scheduled: bool,
}

/// A delivery to schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Ship name
    pub ship_name: String,
    /// Cargo carried
    pub cargo_type: String,
    /// Expected arrival
    pub eta: DateTime<Utc>,
}

/// Docking orchestrator.
#[derive(Clone)]
pub struct DockingOrchestrator {
    env: DockingEnvironment,
    config: DockingConfig,
}

impl DockingOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub const fn new(env: DockingEnvironment, config: DockingConfig) -> Self {
        Self { env, config }
    }

    /// Dock `ship_id` at the lowest-numbered available bay.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown ship, or a store
    /// fault. A persist failure after power was granted releases the grant
    /// best-effort before returning the fault.
    #[tracing::instrument(skip(self), fields(ship_id = %ship_id))]
    pub async fn dock(&self, ship_id: ShipId) -> Result<Outcome<DockingReceipt>> {
        let mut tx = self.env.store.begin().await?;

        let Some(mut ship) = tx.ship_for_update(ship_id).await? else {
            tx.rollback().await?;
            return Err(FacilityError::not_found("ship", ship_id));
        };

        if ship.status == ShipStatus::Docked {
            tx.rollback().await?;
            return Ok(reject(Rejection::AlreadyDocked { ship_id }));
        }

        let Some(mut bay) = tx.first_available_bay_for_update().await? else {
            tx.rollback().await?;
            return Ok(reject(Rejection::NoBayAvailable));
        };

        let system = bay_system(bay.id);
        let grant = match self
            .env
            .power
            .allocate(PowerRequest {
                system: system.clone(),
                amount_kw: self.config.power_per_bay_kw,
                section_id: None,
                priority: self.config.power_priority,
            })
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                tx.rollback().await?;
                tracing::warn!(bay_id = %bay.id, error = %e, "Power allocation failed, dock declined");
                return Ok(reject(Rejection::PowerAllocationFailed {
                    reason: e.to_string(),
                }));
            }
        };

        let now = self.env.clock.now();
        bay.occupy(ship.id);
        ship.status = ShipStatus::Docked;
        ship.arrival_time = Some(now);
        let entry = NewDockingLog {
            ship_id,
            bay_id: Some(bay.id),
            action: DockingAction::Dock,
            timestamp: now,
            details: format!("Ship {} docked at bay {}", ship.name, bay.bay_number),
        };

        if let Err(e) = persist(tx, bay.clone(), ship.clone(), entry).await {
            tracing::error!(bay_id = %bay.id, error = %e, "Dock not persisted, releasing power");
            if let Err(release) = self.env.power.deallocate(&system).await {
                tracing::error!(system, error = %release, "Failed to release power after aborted dock");
            }
            return Err(e.into());
        }

        if ship.crew_count > 0 {
            if let Err(e) = self
                .env
                .crew
                .register_arrival(ship.id, &ship.name, ship.crew_count)
                .await
            {
                tracing::warn!(error = %e, "Crew arrival not registered");
            }
        }

        self.mirror_available_bays().await;

        tracing::info!(bay_id = %bay.id, allocated_kw = grant.allocated_kw, "Ship docked");
        metrics::counter!("nexus.docking.docked").increment(1);

        Ok(Outcome::Completed(DockingReceipt {
            ship_id,
            bay_id: bay.id,
            allocated_kw: grant.allocated_kw,
        }))
    }

    /// Undock `ship_id`, free its bay and schedule its return.
    ///
    /// Crew departure and power release are fire-and-forget. A failure to
    /// write the return timer is logged and reported in the receipt; the
    /// undock itself stands.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown ship,
    /// [`FacilityError::DataInconsistency`] when a docked ship occupies no
    /// bay, or a store fault.
    #[tracing::instrument(skip(self), fields(ship_id = %ship_id))]
    pub async fn undock(&self, ship_id: ShipId) -> Result<Outcome<UndockReceipt>> {
        let mut tx = self.env.store.begin().await?;

        let Some(mut ship) = tx.ship_for_update(ship_id).await? else {
            tx.rollback().await?;
            return Err(FacilityError::not_found("ship", ship_id));
        };

        if ship.status != ShipStatus::Docked {
            tx.rollback().await?;
            return Ok(reject(Rejection::NotDocked {
                ship_id,
                status: ship.status,
            }));
        }

        let Some(mut bay) = tx.bay_occupied_by_for_update(ship_id).await? else {
            tx.rollback().await?;
            tracing::error!("Docked ship occupies no bay");
            return Err(FacilityError::DataInconsistency(format!(
                "ship {ship_id} is DOCKED but occupies no bay"
            )));
        };

        if ship.crew_count > 0 {
            if let Err(e) = self.env.crew.register_departure(&ship.name).await {
                tracing::warn!(error = %e, "Crew departure not registered");
            }
        }

        // TODO: reconcile leaked bay power once the ledger exposes a sweep of
        // allocations whose bay is AVAILABLE.
        if let Err(e) = self.env.power.deallocate(&bay_system(bay.id)).await {
            tracing::warn!(bay_id = %bay.id, error = %e, "Bay power not released");
        }

        let now = self.env.clock.now();
        bay.release();
        ship.status = ShipStatus::Departing;
        ship.departure_time = Some(now);
        let entry = NewDockingLog {
            ship_id,
            bay_id: Some(bay.id),
            action: DockingAction::Undock,
            timestamp: now,
            details: format!("Ship {} left bay {}", ship.name, bay.bay_number),
        };
        persist(tx, bay.clone(), ship, entry).await?;

        let return_scheduled = match self
            .env
            .trigger
            .schedule(ship_id, self.config.return_delay)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Return not scheduled, ship stays DEPARTING");
                false
            }
        };

        self.mirror_available_bays().await;

        tracing::info!(bay_id = %bay.id, return_scheduled, "Ship undocked");

        Ok(Outcome::Completed(UndockReceipt {
            ship_id,
            bay_id: bay.id,
            return_scheduled,
        }))
    }

    /// Create an incoming cargo ship for a delivery.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    #[tracing::instrument(skip(self, request), fields(ship_name = %request.ship_name))]
    pub async fn schedule_delivery(&self, request: DeliveryRequest) -> Result<Outcome<Ship>> {
        let name = request.ship_name.trim();
        if name.is_empty() {
            return Ok(Outcome::Rejected(Rejection::InvalidInput(
                "ship name must not be empty".to_string(),
            )));
        }

        let mut tx = self.env.store.begin().await?;
        let ship = tx
            .insert_ship(NewShip {
                name: name.to_string(),
                ship_type: ShipType::Cargo,
                status: ShipStatus::Incoming,
                crew_count: self.config.delivery_crew,
                cargo_capacity: self.config.delivery_cargo_capacity,
                arrival_time: Some(request.eta),
            })
            .await?;
        tx.append_log(NewDockingLog {
            ship_id: ship.id,
            bay_id: None,
            action: DockingAction::ArrivalScheduled,
            timestamp: self.env.clock.now(),
            details: format!(
                "Delivery of {} scheduled, ETA {}",
                request.cargo_type,
                request.eta.to_rfc3339()
            ),
        })
        .await?;
        tx.commit().await?;

        tracing::info!(ship_id = %ship.id, cargo_type = %request.cargo_type, "Delivery scheduled");
        Ok(Outcome::Completed(ship))
    }

    /// All bays, by bay number.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn bays(&self) -> Result<Vec<Bay>> {
        Ok(self.env.store.bays().await?)
    }

    /// All ships.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn ships(&self) -> Result<Vec<Ship>> {
        Ok(self.env.store.ships().await?)
    }

    /// Incoming ships, by arrival time.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn incoming_ships(&self) -> Result<Vec<Ship>> {
        Ok(self.env.store.ships_with_status(ShipStatus::Incoming).await?)
    }

    /// Most recent audit records.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn logs(&self, limit: usize) -> Result<Vec<DockingLog>> {
        Ok(self.env.store.logs(limit).await?)
    }

    /// Bay and ship counts.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn summary(&self) -> Result<DockingSummary> {
        let bays = self.env.store.bays().await?;
        let ships = self.env.store.ships().await?;

        let bays_in = |status| count(bays.iter().filter(|b| b.status == status).count());
        let ships_in = |status| count(ships.iter().filter(|s| s.status == status).count());

        Ok(DockingSummary {
            total_bays: count(bays.len()),
            available_bays: bays_in(BayStatus::Available),
            occupied_bays: bays_in(BayStatus::Occupied),
            reserved_bays: bays_in(BayStatus::Reserved),
            incoming_ships: ships_in(ShipStatus::Incoming),
            docked_ships: ships_in(ShipStatus::Docked),
        })
    }

    async fn mirror_available_bays(&self) {
        let available = match self.env.store.bays().await {
            Ok(bays) => bays
                .iter()
                .filter(|b| b.status == BayStatus::Available)
                .count(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count available bays");
                return;
            }
        };
        if let Err(e) = self
            .env
            .cache
            .set(
                AVAILABLE_BAYS_KEY,
                &available.to_string(),
                Some(self.config.cache_ttl),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to mirror available bays");
        }
    }
}

fn reject<T>(rejection: Rejection) -> Outcome<T> {
    tracing::info!(reason = rejection.code(), "Docking request declined");
    metrics::counter!("nexus.docking.rejected", "reason" => rejection.code()).increment(1);
    Outcome::Rejected(rejection)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

async fn persist(
    mut tx: Box<dyn DockingTx>,
    bay: Bay,
    ship: Ship,
    entry: NewDockingLog,
) -> StoreResult<()> {
    tx.update_bay(bay).await?;
    tx.update_ship(ship).await?;
    tx.append_log(entry).await?;
    tx.commit().await
}

impl SummaryProvider<DockingSummary> for DockingOrchestrator {
    fn name(&self) -> &str {
        "docking"
    }

    fn summary(&self) -> BoxFuture<'_, std::result::Result<DockingSummary, CollaboratorError>> {
        Box::pin(async move {
            DockingOrchestrator::summary(self)
                .await
                .map_err(|e| CollaboratorError::Unreachable {
                    collaborator: "docking".to_string(),
                    message: e.to_string(),
                })
        })
    }

    fn ping(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.env.store.bays().await.is_ok() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::trigger::{TriggerConfig, TriggerOutcome, return_key};
    use nexus_testing::collaborators::{RecordingCrew, RecordingPower};
    use nexus_testing::{InMemoryKeyValueStore, InMemoryStore, fixtures, test_clock};

    struct Harness {
        store: InMemoryStore,
        kv: Arc<InMemoryKeyValueStore>,
        power: RecordingPower,
        crew: RecordingCrew,
        trigger: Arc<TransitionTrigger>,
        docking: DockingOrchestrator,
    }

    fn harness() -> Harness {
        let store = InMemoryStore::new();
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let power = RecordingPower::new();
        let crew = RecordingCrew::new();
        let clock = Arc::new(test_clock());
        let trigger = Arc::new(TransitionTrigger::new(
            kv.clone(),
            Arc::new(store.clone()),
            clock.clone(),
            TriggerConfig::default(),
        ));
        let docking = DockingOrchestrator::new(
            DockingEnvironment {
                store: Arc::new(store.clone()),
                power: Arc::new(power.clone()),
                crew: Arc::new(crew.clone()),
                trigger: trigger.clone(),
                cache: kv.clone(),
                clock,
            },
            DockingConfig::default(),
        );
        Harness {
            store,
            kv,
            power,
            crew,
            trigger,
            docking,
        }
    }

    fn ship(id: i64) -> ShipId {
        ShipId::new(id)
    }

    #[tokio::test]
    async fn dock_occupies_bay_and_allocates_power() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 12));

        let receipt = h.docking.dock(ship(10)).await.unwrap().into_result().unwrap();
        assert_eq!(receipt.bay_id, BayId::new(1));
        assert_eq!(receipt.allocated_kw, 50.0);

        let bay = h.store.bay_row(BayId::new(1)).unwrap();
        assert_eq!(bay.status, BayStatus::Occupied);
        assert_eq!(bay.occupant, Some(ship(10)));

        let docked = h.store.ship_row(ship(10)).unwrap();
        assert_eq!(docked.status, ShipStatus::Docked);
        assert_eq!(docked.arrival_time, Some(test_clock().now()));

        let request = &h.power.requests()[0];
        assert_eq!(request.system, "docking_bay_1");
        assert_eq!(request.priority, 4);

        assert_eq!(h.store.docking_log_rows()[0].action, DockingAction::Dock);
        assert_eq!(h.crew.arrivals()[0].crew_count, 12);
        assert_eq!(h.kv.value(AVAILABLE_BAYS_KEY).as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn dock_picks_lowest_bay_number() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 3, BayStatus::Available));
        h.store.insert_bay(fixtures::bay(2, 1, BayStatus::Maintenance));
        h.store.insert_bay(fixtures::bay(3, 2, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 0));

        let receipt = h.docking.dock(ship(10)).await.unwrap().into_result().unwrap();
        assert_eq!(receipt.bay_id, BayId::new(3));
        assert!(h.crew.arrivals().is_empty());
    }

    #[tokio::test]
    async fn docked_ship_cannot_dock_again() {
        let h = harness();
        h.store.insert_bay(fixtures::occupied_bay(1, 1, 10));
        h.store.insert_bay(fixtures::bay(2, 2, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Docked, 3));

        let outcome = h.docking.dock(ship(10)).await.unwrap();
        assert_eq!(
            outcome.rejection(),
            Some(&Rejection::AlreadyDocked { ship_id: ship(10) })
        );
        assert!(h.power.requests().is_empty());
    }

    #[tokio::test]
    async fn no_bay_available_leaves_ship_unchanged() {
        let h = harness();
        for id in 1..=3 {
            h.store.insert_bay(fixtures::occupied_bay(id, i32::try_from(id).unwrap(), 100 + id));
        }
        let before = fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 3);
        h.store.insert_ship(before.clone());

        let outcome = h.docking.dock(ship(10)).await.unwrap();
        assert_eq!(outcome.rejection(), Some(&Rejection::NoBayAvailable));
        assert_eq!(h.store.ship_row(ship(10)).unwrap(), before);
        assert!(h.power.requests().is_empty());
    }

    #[tokio::test]
    async fn power_failure_declines_without_side_effects() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        let before = fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 3);
        h.store.insert_ship(before.clone());
        h.power.decline_allocations("Insufficient power");

        let outcome = h.docking.dock(ship(10)).await.unwrap();
        assert!(matches!(
            outcome.rejection(),
            Some(Rejection::PowerAllocationFailed { .. })
        ));
        assert_eq!(
            h.store.bay_row(BayId::new(1)).unwrap().status,
            BayStatus::Available
        );
        assert_eq!(h.store.ship_row(ship(10)).unwrap(), before);
        assert!(h.store.docking_log_rows().is_empty());
        assert!(h.crew.arrivals().is_empty());
    }

    #[tokio::test]
    async fn crew_failure_does_not_abort_dock() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 3));
        h.crew.set_failing(true);

        assert!(h.docking.dock(ship(10)).await.unwrap().is_completed());
        assert_eq!(h.store.ship_row(ship(10)).unwrap().status, ShipStatus::Docked);
    }

    #[tokio::test]
    async fn persist_failure_releases_granted_power() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 3));
        h.store.set_commit_failure(true);

        assert!(h.docking.dock(ship(10)).await.is_err());
        assert_eq!(h.power.deallocations(), vec!["docking_bay_1".to_string()]);
        assert_eq!(
            h.store.bay_row(BayId::new(1)).unwrap().status,
            BayStatus::Available
        );
    }

    #[tokio::test]
    async fn unknown_ship_is_not_found() {
        let h = harness();
        let err = h.docking.dock(ship(404)).await.unwrap_err();
        assert!(matches!(err, FacilityError::NotFound { entity: "ship", .. }));
    }

    #[tokio::test]
    async fn concurrent_docks_never_share_a_bay() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 0));
        h.store
            .insert_ship(fixtures::ship(11, "Tachi", ShipStatus::Incoming, 0));

        let (a, b) = tokio::join!(h.docking.dock(ship(10)), h.docking.dock(ship(11)));
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_completed()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|o| o.rejection() == Some(&Rejection::NoBayAvailable))
        );
        let docked = [ship(10), ship(11)]
            .into_iter()
            .filter(|id| h.store.ship_row(*id).unwrap().status == ShipStatus::Docked)
            .count();
        assert_eq!(docked, 1);
        assert!(h.store.bay_rows().iter().all(Bay::is_consistent));
    }

    #[tokio::test]
    async fn concurrent_docks_of_one_ship_take_one_bay() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store.insert_bay(fixtures::bay(2, 2, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 0));

        let (a, b) = tokio::join!(h.docking.dock(ship(10)), h.docking.dock(ship(10)));
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_completed()).count(), 1);
        let occupied = h
            .store
            .bay_rows()
            .iter()
            .filter(|b| b.occupant == Some(ship(10)))
            .count();
        assert_eq!(occupied, 1);
    }

    #[tokio::test]
    async fn undock_frees_bay_and_schedules_return() {
        let h = harness();
        h.store.insert_bay(fixtures::occupied_bay(1, 1, 10));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Docked, 3));

        let receipt = h.docking.undock(ship(10)).await.unwrap().into_result().unwrap();
        assert_eq!(receipt.bay_id, BayId::new(1));
        assert!(receipt.return_scheduled);

        let bay = h.store.bay_row(BayId::new(1)).unwrap();
        assert_eq!(bay.status, BayStatus::Available);
        assert_eq!(bay.occupant, None);

        let departed = h.store.ship_row(ship(10)).unwrap();
        assert_eq!(departed.status, ShipStatus::Departing);
        assert!(departed.departure_time.is_some());

        assert_eq!(h.power.deallocations(), vec!["docking_bay_1".to_string()]);
        assert_eq!(h.crew.departures(), vec!["Nauvoo".to_string()]);
        assert!(h.trigger.is_pending(ship(10)).await.unwrap());
        assert!(h.kv.ttl(&return_key(ship(10))).unwrap() <= Duration::from_secs(60));
        assert_eq!(h.store.docking_log_rows()[0].action, DockingAction::Undock);
    }

    #[tokio::test]
    async fn undock_survives_collaborator_failures() {
        let h = harness();
        h.store.insert_bay(fixtures::occupied_bay(1, 1, 10));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Docked, 3));
        h.power.fail_deallocations(true);
        h.crew.set_failing(true);

        assert!(h.docking.undock(ship(10)).await.unwrap().is_completed());
        assert_eq!(
            h.store.bay_row(BayId::new(1)).unwrap().status,
            BayStatus::Available
        );
    }

    #[tokio::test]
    async fn undock_reports_unscheduled_return() {
        let h = harness();
        h.store.insert_bay(fixtures::occupied_bay(1, 1, 10));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Docked, 3));
        h.kv.set_failing(true);

        let receipt = h.docking.undock(ship(10)).await.unwrap().into_result().unwrap();
        assert!(!receipt.return_scheduled);
        assert_eq!(
            h.store.ship_row(ship(10)).unwrap().status,
            ShipStatus::Departing
        );
    }

    #[tokio::test]
    async fn undock_requires_docked_ship() {
        let h = harness();
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 3));

        let outcome = h.docking.undock(ship(10)).await.unwrap();
        assert_eq!(
            outcome.rejection(),
            Some(&Rejection::NotDocked {
                ship_id: ship(10),
                status: ShipStatus::Incoming,
            })
        );
    }

    #[tokio::test]
    async fn docked_ship_without_bay_is_inconsistent() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Docked, 3));

        let err = h.docking.undock(ship(10)).await.unwrap_err();
        assert!(matches!(err, FacilityError::DataInconsistency(_)));
        assert_eq!(h.store.ship_row(ship(10)).unwrap().status, ShipStatus::Docked);
        assert!(h.power.deallocations().is_empty());
    }

    #[tokio::test]
    async fn full_cycle_returns_ship_for_docking() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Incoming, 3));

        assert!(h.docking.dock(ship(10)).await.unwrap().is_completed());
        assert!(h.docking.undock(ship(10)).await.unwrap().is_completed());

        assert!(h.kv.expire_now(&return_key(ship(10))));
        assert_eq!(
            h.trigger.handle_expired(&return_key(ship(10))).await,
            TriggerOutcome::Transitioned(ship(10))
        );
        assert_eq!(
            h.store.ship_row(ship(10)).unwrap().status,
            ShipStatus::Incoming
        );

        assert!(h.docking.dock(ship(10)).await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn schedule_delivery_creates_incoming_cargo_ship() {
        let h = harness();
        let eta = test_clock().now() + chrono::Duration::hours(2);

        let ship = h
            .docking
            .schedule_delivery(DeliveryRequest {
                ship_name: "Guy Molinari".to_string(),
                cargo_type: "ice".to_string(),
                eta,
            })
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(ship.ship_type, ShipType::Cargo);
        assert_eq!(ship.status, ShipStatus::Incoming);
        assert_eq!(ship.crew_count, 5);
        assert_eq!(ship.cargo_capacity, 2000);
        assert_eq!(ship.arrival_time, Some(eta));

        let incoming = h.docking.incoming_ships().await.unwrap();
        assert_eq!(incoming.len(), 1);

        let log = &h.docking.logs(10).await.unwrap()[0];
        assert_eq!(log.action, DockingAction::ArrivalScheduled);
        assert!(log.details.contains("ice"));
    }

    #[tokio::test]
    async fn delivery_needs_a_name() {
        let h = harness();
        let outcome = h
            .docking
            .schedule_delivery(DeliveryRequest {
                ship_name: "  ".to_string(),
                cargo_type: "ice".to_string(),
                eta: test_clock().now(),
            })
            .await
            .unwrap();
        assert!(outcome.rejection().unwrap().is_invalid_input());
        assert!(h.docking.ships().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_counts_bays_and_ships() {
        let h = harness();
        h.store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        h.store.insert_bay(fixtures::occupied_bay(2, 2, 10));
        h.store.insert_bay(fixtures::bay(3, 3, BayStatus::Reserved));
        h.store
            .insert_ship(fixtures::ship(10, "Nauvoo", ShipStatus::Docked, 3));
        h.store
            .insert_ship(fixtures::ship(11, "Tachi", ShipStatus::Incoming, 3));

        let summary = h.docking.summary().await.unwrap();
        assert_eq!(
            summary,
            DockingSummary {
                total_bays: 3,
                available_bays: 1,
                occupied_bays: 1,
                reserved_bays: 1,
                incoming_ships: 1,
                docked_ships: 1,
            }
        );
    }
}
