//! Outbound collaborator ports.
//!
//! Collaborators are other services reached over the network. Calls are
//! synchronous from the caller's point of view, carry no built-in retry, and
//! each call site decides how a failure is treated:
//!
//! | Policy | Meaning |
//! |--------|---------|
//! | fire-and-forget | log only, never affects the caller's outcome |
//! | abort-before-mutation | nothing written yet, decline cleanly |
//! | compensate-after-mutation | write the inverse locally, then fault |

use crate::error::CollaboratorError;
use crate::ids::{SectionId, ShipId};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Power request sent to the power collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerRequest {
    /// Consumer system name
    pub system: String,
    /// Amount in kW
    pub amount_kw: f64,
    /// Section the consumer serves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<SectionId>,
    /// Priority, 1 is most important
    pub priority: i32,
}

/// Power granted by the power collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerGrant {
    /// Consumer system name
    pub system: String,
    /// Total now held by the consumer in kW
    pub allocated_kw: f64,
    /// Priority recorded for the consumer
    pub priority: i32,
}

/// The power service.
pub trait PowerCollaborator: Send + Sync {
    /// Allocate power to a consumer system.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the call fails or is declined.
    fn allocate(&self, request: PowerRequest) -> BoxFuture<'_, Result<PowerGrant, CollaboratorError>>;

    /// Release everything a consumer system holds. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the call fails.
    fn deallocate<'a>(&'a self, system: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// The crew service. Failures are soft: callers log them and carry on.
pub trait CrewCollaborator: Send + Sync {
    /// Register the crew of a ship that just docked.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the call fails.
    fn register_arrival<'a>(
        &'a self,
        ship_id: ShipId,
        ship_name: &'a str,
        crew_count: i32,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;

    /// Note that a ship's crew left.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the call fails.
    fn register_departure<'a>(&'a self, ship_name: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// A service that provisions resources per section occupant (life support).
pub trait CapacityConsumer: Send + Sync {
    /// Report an occupancy change for a section.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the change could not be provisioned.
    fn adjust_capacity(
        &self,
        section_id: SectionId,
        delta: i32,
    ) -> BoxFuture<'_, Result<(), CollaboratorError>>;
}

/// A per-domain status source for the aggregation gateway.
pub trait SummaryProvider<T>: Send + Sync {
    /// Provider name used in logs and health reports.
    fn name(&self) -> &str;

    /// Fetch the current summary.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the provider cannot answer.
    fn summary(&self) -> BoxFuture<'_, Result<T, CollaboratorError>>;

    /// Reachability probe.
    fn ping(&self) -> BoxFuture<'_, bool>;
}
