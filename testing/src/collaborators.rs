//! Scriptable collaborator mocks.
//!
//! Each mock records the calls it receives and can be switched into a
//! failing mode, so tests can drive every failure policy of the caller.

use futures::future::BoxFuture;
use nexus_core::CollaboratorError;
use nexus_core::collaborators::{
    CapacityConsumer, CrewCollaborator, PowerCollaborator, PowerGrant, PowerRequest,
    SummaryProvider,
};
use nexus_core::ids::{SectionId, ShipId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn unreachable(collaborator: &str) -> CollaboratorError {
    CollaboratorError::Unreachable {
        collaborator: collaborator.to_string(),
        message: "connection refused".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ═══════════════════════════════════════════════════════════════════════════
// Power
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct PowerState {
    requests: Vec<PowerRequest>,
    deallocations: Vec<String>,
    held: HashMap<String, f64>,
    allocate_error: Option<CollaboratorError>,
    deallocate_fails: bool,
}

/// Power collaborator that grants everything unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct RecordingPower {
    state: Arc<Mutex<PowerState>>,
}

impl RecordingPower {
    /// Create a mock that grants every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every allocation with `error` (or stop failing with `None`).
    pub fn fail_allocations(&self, error: Option<CollaboratorError>) {
        lock(&self.state).allocate_error = error;
    }

    /// Decline every allocation as the power service would.
    pub fn decline_allocations(&self, message: &str) {
        self.fail_allocations(Some(CollaboratorError::Rejected {
            collaborator: "power".to_string(),
            message: message.to_string(),
        }));
    }

    /// Fail every deallocation.
    pub fn fail_deallocations(&self, fail: bool) {
        lock(&self.state).deallocate_fails = fail;
    }

    /// Allocation requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<PowerRequest> {
        lock(&self.state).requests.clone()
    }

    /// Deallocation calls received, in order.
    #[must_use]
    pub fn deallocations(&self) -> Vec<String> {
        lock(&self.state).deallocations.clone()
    }

    /// Amount currently held by `system`.
    #[must_use]
    pub fn held(&self, system: &str) -> f64 {
        lock(&self.state).held.get(system).copied().unwrap_or_default()
    }
}

impl PowerCollaborator for RecordingPower {
    fn allocate(&self, request: PowerRequest) -> BoxFuture<'_, Result<PowerGrant, CollaboratorError>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.requests.push(request.clone());
            if let Some(error) = state.allocate_error.clone() {
                return Err(error);
            }
            let held = state.held.entry(request.system.clone()).or_default();
            *held += request.amount_kw;
            Ok(PowerGrant {
                system: request.system,
                allocated_kw: *held,
                priority: request.priority,
            })
        })
    }

    fn deallocate<'a>(&'a self, system: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.deallocations.push(system.to_string());
            if state.deallocate_fails {
                return Err(unreachable("power"));
            }
            state.held.remove(system);
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Crew
// ═══════════════════════════════════════════════════════════════════════════

/// A crew arrival registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    /// Ship that docked
    pub ship_id: ShipId,
    /// Its name
    pub ship_name: String,
    /// People aboard
    pub crew_count: i32,
}

#[derive(Debug, Default)]
struct CrewState {
    arrivals: Vec<Arrival>,
    departures: Vec<String>,
    failing: bool,
}

/// Crew collaborator that records registrations.
#[derive(Debug, Clone, Default)]
pub struct RecordingCrew {
    state: Arc<Mutex<CrewState>>,
}

impl RecordingCrew {
    /// Create a mock that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call until reset.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Arrivals received, in order. Failed calls are recorded too.
    #[must_use]
    pub fn arrivals(&self) -> Vec<Arrival> {
        lock(&self.state).arrivals.clone()
    }

    /// Departures received, in order. Failed calls are recorded too.
    #[must_use]
    pub fn departures(&self) -> Vec<String> {
        lock(&self.state).departures.clone()
    }
}

impl CrewCollaborator for RecordingCrew {
    fn register_arrival<'a>(
        &'a self,
        ship_id: ShipId,
        ship_name: &'a str,
        crew_count: i32,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.arrivals.push(Arrival {
                ship_id,
                ship_name: ship_name.to_string(),
                crew_count,
            });
            if state.failing {
                return Err(unreachable("crew"));
            }
            Ok(())
        })
    }

    fn register_departure<'a>(&'a self, ship_name: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.departures.push(ship_name.to_string());
            if state.failing {
                return Err(unreachable("crew"));
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Capacity consumer
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct ConsumerState {
    adjustments: Vec<(SectionId, i32)>,
    failing: bool,
}

/// Capacity consumer (life support) that records adjustments.
#[derive(Debug, Clone, Default)]
pub struct RecordingCapacityConsumer {
    state: Arc<Mutex<ConsumerState>>,
}

impl RecordingCapacityConsumer {
    /// Create a mock that accepts every adjustment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every adjustment until reset.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Successful adjustments, in order.
    #[must_use]
    pub fn adjustments(&self) -> Vec<(SectionId, i32)> {
        lock(&self.state).adjustments.clone()
    }
}

impl CapacityConsumer for RecordingCapacityConsumer {
    fn adjust_capacity(
        &self,
        section_id: SectionId,
        delta: i32,
    ) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.failing {
                return Err(unreachable("life-support"));
            }
            state.adjustments.push((section_id, delta));
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Summary providers
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Behavior<T> {
    Answer(T),
    Fail,
    Slow(T, Duration),
}

/// Summary provider with a fixed behavior.
#[derive(Debug, Clone)]
pub struct StubSummaryProvider<T> {
    name: String,
    behavior: Behavior<T>,
}

impl<T> StubSummaryProvider<T> {
    /// Answer every call with `value`.
    pub fn answering(name: &str, value: T) -> Self {
        Self {
            name: name.to_string(),
            behavior: Behavior::Answer(value),
        }
    }

    /// Fail every call and report down.
    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behavior: Behavior::Fail,
        }
    }

    /// Answer with `value` after `delay`.
    pub fn slow(name: &str, value: T, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            behavior: Behavior::Slow(value, delay),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SummaryProvider<T> for StubSummaryProvider<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) -> BoxFuture<'_, Result<T, CollaboratorError>> {
        Box::pin(async move {
            match &self.behavior {
                Behavior::Answer(value) => Ok(value.clone()),
                Behavior::Fail => Err(unreachable(&self.name)),
                Behavior::Slow(value, delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(value.clone())
                }
            }
        })
    }

    fn ping(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match &self.behavior {
                Behavior::Answer(_) => true,
                Behavior::Fail => false,
                Behavior::Slow(_, delay) => {
                    tokio::time::sleep(*delay).await;
                    true
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn power_accumulates_per_system() {
        let power = RecordingPower::new();
        let request = PowerRequest {
            system: "docking_bay_1".to_string(),
            amount_kw: 50.0,
            section_id: None,
            priority: 4,
        };
        power.allocate(request.clone()).await.unwrap();
        let grant = power.allocate(request).await.unwrap();
        assert_eq!(grant.allocated_kw, 100.0);

        power.deallocate("docking_bay_1").await.unwrap();
        assert_eq!(power.held("docking_bay_1"), 0.0);
        assert_eq!(power.deallocations(), vec!["docking_bay_1".to_string()]);
    }

    #[tokio::test]
    async fn declined_power_is_reported_as_rejection() {
        let power = RecordingPower::new();
        power.decline_allocations("Insufficient capacity");
        let err = power
            .allocate(PowerRequest {
                system: "x".to_string(),
                amount_kw: 1.0,
                section_id: None,
                priority: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected { .. }));
    }

    #[tokio::test]
    async fn failing_stub_reports_down() {
        let provider: StubSummaryProvider<u32> = StubSummaryProvider::failing("inventory");
        assert!(provider.summary().await.is_err());
        assert!(!provider.ping().await);
        assert_eq!(provider.name(), "inventory");
    }
}
