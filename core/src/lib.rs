//! # Nexus Core
//!
//! Domain model, error taxonomy and port traits for the Nexus facility
//! coordination layer.
//!
//! The facility is run by independently-failing services that share scarce,
//! capacity-bounded resources: docking bays, power kilowatts and section
//! occupancy. This crate holds everything those services agree on and
//! nothing that performs I/O:
//!
//! - **Model**: ships, bays, sections, crew, power sources and allocations,
//!   addressed by newtype ids ([`ids`], [`model`])
//! - **Outcome**: the discriminated result every coordination operation
//!   returns ([`outcome`])
//! - **Errors**: faults that propagate to the boundary ([`error`])
//! - **Ports**: traits the runtime is written against ([`store`], [`kv`],
//!   [`collaborators`])
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ nexus-web     axum routes, HTTP clients      │
//! ├──────────────────────────────────────────────┤
//! │ nexus-runtime ledger, mutex, trigger, sagas  │
//! ├──────────────────────────────────────────────┤
//! │ nexus-core    model, outcome, errors, ports  │
//! ├──────────────────────┬───────────────────────┤
//! │ nexus-postgres       │ nexus-redis           │
//! │ (relational store)   │ (key-value store)     │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! ## Outcomes vs. faults
//!
//! Expected business results (a bay is not free, a section is full) are
//! values of [`Outcome::Rejected`]. Only infrastructure and data faults use
//! the `Err` side:
//!
//! ```
//! use nexus_core::{Outcome, Rejection};
//!
//! let outcome: Outcome<u32> = Outcome::Rejected(Rejection::NoBayAvailable);
//! assert!(outcome.is_rejected());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collaborators;
pub mod error;
pub mod ids;
pub mod kv;
pub mod model;
pub mod outcome;
pub mod store;
pub mod summary;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{CollaboratorError, FacilityError, KvError, Rejection, Result, StoreError};
pub use ids::{BayId, CrewMemberId, PoolId, SectionId, ShipId};
pub use outcome::Outcome;

/// Environment module - injected dependencies that are not stores
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use nexus_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
