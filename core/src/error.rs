//! Error taxonomy.
//!
//! Two families:
//!
//! - [`Rejection`]: expected business outcomes. Never propagated with `?`;
//!   they travel inside [`crate::Outcome::Rejected`] and map to 4xx at the
//!   edge.
//! - [`FacilityError`]: faults. These propagate to the boundary, where they
//!   are logged and translated to a generic failure.
//!
//! Adapter-level errors ([`StoreError`], [`KvError`], [`CollaboratorError`])
//! are produced by port implementations and folded into [`FacilityError`]
//! where the runtime decides they are fatal.

use crate::ids::{SectionId, ShipId};
use thiserror::Error;

/// Expected business outcomes that decline an operation without mutation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    // ═══════════════════════════════════════════════════════════════════════
    // Docking
    // ═══════════════════════════════════════════════════════════════════════
    /// Ship already occupies a bay.
    #[error("Ship {ship_id} is already docked")]
    AlreadyDocked {
        /// Ship concerned
        ship_id: ShipId,
    },

    /// Ship cannot undock because it is not docked.
    #[error("Ship {ship_id} is not docked (status {status})")]
    NotDocked {
        /// Ship concerned
        ship_id: ShipId,
        /// Its current status
        status: crate::model::ShipStatus,
    },

    /// Every bay is occupied, reserved or in maintenance.
    #[error("No docking bay available")]
    NoBayAvailable,

    /// The power collaborator declined or failed before any local change.
    #[error("Power allocation failed: {reason}")]
    PowerAllocationFailed {
        /// Collaborator message
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Capacity
    // ═══════════════════════════════════════════════════════════════════════
    /// Section would exceed its maximum occupancy.
    #[error("Section {section_id} is at capacity ({occupancy}/{max_capacity})")]
    CapacityExceeded {
        /// Section concerned
        section_id: SectionId,
        /// Occupancy the request would have produced or found
        occupancy: i32,
        /// Limit
        max_capacity: i32,
    },

    /// Pool cannot cover the requested amount.
    #[error("Insufficient capacity: requested {requested_kw} kW, available {available_kw} kW")]
    InsufficientCapacity {
        /// Amount asked for
        requested_kw: f64,
        /// Amount free at decision time
        available_kw: f64,
    },

    /// No section can take a whole arriving crew.
    #[error("No section has room for {needed} arriving crew")]
    NoSectionAvailable {
        /// Occupants that needed a place
        needed: i32,
    },

    /// Occupant already belongs to the target section.
    #[error("Crew member is already assigned to section {section_id}")]
    AlreadyInSection {
        /// Section concerned
        section_id: SectionId,
    },

    /// Input outside the accepted range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Rejection {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyDocked { .. } => "ALREADY_DOCKED",
            Self::NotDocked { .. } => "NOT_DOCKED",
            Self::NoBayAvailable => "NO_BAY_AVAILABLE",
            Self::PowerAllocationFailed { .. } => "POWER_ALLOCATION_FAILED",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            Self::NoSectionAvailable { .. } => "NO_SECTION_AVAILABLE",
            Self::AlreadyInSection { .. } => "ALREADY_IN_SECTION",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Whether the rejection is about malformed input rather than state.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Errors raised by relational store adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A row could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A row lock could not be obtained.
    #[error("Row lock unavailable: {0}")]
    LockUnavailable(String),
}

/// Errors raised by key-value store adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// Connection could not be established or was lost.
    #[error("Key-value connection error: {0}")]
    Connection(String),

    /// A command failed.
    #[error("Key-value command error: {0}")]
    Command(String),

    /// Expiry subscription could not be set up.
    #[error("Key-value subscription error: {0}")]
    Subscription(String),
}

/// Errors raised by outbound collaborator calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator could not be reached or timed out.
    #[error("{collaborator} unreachable: {message}")]
    Unreachable {
        /// Collaborator name
        collaborator: String,
        /// Transport message
        message: String,
    },

    /// The collaborator answered and declined.
    #[error("{collaborator} rejected the request: {message}")]
    Rejected {
        /// Collaborator name
        collaborator: String,
        /// Reason given
        message: String,
    },

    /// The collaborator answered with something unreadable.
    #[error("{collaborator} sent an invalid response: {message}")]
    InvalidResponse {
        /// Collaborator name
        collaborator: String,
        /// Decode failure
        message: String,
    },
}

impl CollaboratorError {
    /// Name of the collaborator that failed.
    #[must_use]
    pub fn collaborator(&self) -> &str {
        match self {
            Self::Unreachable { collaborator, .. }
            | Self::Rejected { collaborator, .. }
            | Self::InvalidResponse { collaborator, .. } => collaborator,
        }
    }
}

/// Faults that propagate to the boundary.
#[derive(Error, Debug)]
pub enum FacilityError {
    /// Unknown ship, bay, section, crew member or pool.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Id as given
        id: String,
    },

    /// A collaborator failed on a path where that is fatal.
    #[error("{collaborator} unavailable: {message}")]
    DownstreamUnavailable {
        /// Collaborator name
        collaborator: String,
        /// What failed
        message: String,
    },

    /// Persisted state violates an invariant. Never auto-repaired.
    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    /// Mutex could not be obtained in time. Retryable.
    #[error("Timed out waiting for lock {key}")]
    LockTimeout {
        /// Lock key
        key: String,
    },

    /// Relational store failure.
    #[error(transparent)]
    Store(StoreError),

    /// Key-value store failure.
    #[error(transparent)]
    KeyValue(#[from] KvError),
}

impl FacilityError {
    /// Build a [`FacilityError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::DownstreamUnavailable { .. }
        )
    }
}

impl From<CollaboratorError> for FacilityError {
    fn from(err: CollaboratorError) -> Self {
        Self::DownstreamUnavailable {
            collaborator: err.collaborator().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for FacilityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockUnavailable(key) => Self::LockTimeout { key },
            other => Self::Store(other),
        }
    }
}

/// Result type for coordination operations.
pub type Result<T> = std::result::Result<T, FacilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(Rejection::NoBayAvailable.code(), "NO_BAY_AVAILABLE");
        assert_eq!(
            Rejection::CapacityExceeded {
                section_id: SectionId::new(2),
                occupancy: 10,
                max_capacity: 10,
            }
            .to_string(),
            "Section 2 is at capacity (10/10)"
        );
    }

    #[test]
    fn collaborator_failure_becomes_downstream_fault() {
        let err: FacilityError = CollaboratorError::Unreachable {
            collaborator: "power".to_string(),
            message: "connection refused".to_string(),
        }
        .into();
        assert!(matches!(
            &err,
            FacilityError::DownstreamUnavailable { collaborator, .. } if collaborator == "power"
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn unavailable_row_lock_becomes_retryable_lock_timeout() {
        let err: FacilityError = StoreError::LockUnavailable("connection pool".to_string()).into();
        assert!(matches!(
            &err,
            FacilityError::LockTimeout { key } if key == "connection pool"
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_store_failures_stay_store_faults() {
        let err: FacilityError = StoreError::Database("syntax error".to_string()).into();
        assert!(matches!(err, FacilityError::Store(StoreError::Database(_))));
        assert!(!err.is_retryable());
    }
}
