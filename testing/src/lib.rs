//! # Nexus Testing
//!
//! Testing utilities for the Nexus coordination layer.
//!
//! This crate provides:
//! - In-memory implementations of every port ([`store`], [`kv`])
//! - Scriptable collaborator mocks ([`collaborators`])
//! - Deterministic clocks ([`mocks`])
//! - Row builders ([`fixtures`]) and proptest strategies ([`properties`])
//!
//! ## Example
//!
//! ```ignore
//! use nexus_testing::{fixtures, store::InMemoryStore};
//!
//! #[tokio::test]
//! async fn relocation_moves_occupancy() {
//!     let store = InMemoryStore::new();
//!     store.insert_section(fixtures::section(1, 10, 3));
//!     store.insert_section(fixtures::section(2, 10, 0));
//!     store.insert_crew_member(fixtures::crew_member(7, Some(1)));
//!     // build a guard over `store` and relocate crew member 7 ...
//! }
//! ```

use chrono::{DateTime, Utc};
use nexus_core::environment::Clock;

pub mod collaborators;
pub mod kv;
pub mod store;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time unless advanced explicitly, making tests
    /// reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_testing::mocks::FixedClock;
    /// use nexus_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    ///
    /// clock.advance(Duration::seconds(60));
    /// assert_eq!(clock.now() - time1, Duration::seconds(60));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward. Clones share the same time.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Row builders with sensible defaults.
pub mod fixtures {
    use nexus_core::ids::{BayId, CrewMemberId, PoolId, SectionId, ShipId};
    use nexus_core::model::{
        Bay, BayStatus, CrewMember, CrewStatus, PowerSource, ResourcePool, Section, Ship,
        ShipStatus, ShipType, SourceStatus, SourceType,
    };

    /// A bay; occupancy is left empty regardless of `status`.
    #[must_use]
    pub const fn bay(id: i64, bay_number: i32, status: BayStatus) -> Bay {
        Bay {
            id: BayId::new(id),
            bay_number,
            status,
            occupant: None,
            capacity: 1,
        }
    }

    /// A bay holding `ship`.
    #[must_use]
    pub const fn occupied_bay(id: i64, bay_number: i32, ship: i64) -> Bay {
        Bay {
            id: BayId::new(id),
            bay_number,
            status: BayStatus::Occupied,
            occupant: Some(ShipId::new(ship)),
            capacity: 1,
        }
    }

    /// A passenger ship.
    #[must_use]
    pub fn ship(id: i64, name: &str, status: ShipStatus, crew_count: i32) -> Ship {
        Ship {
            id: ShipId::new(id),
            name: name.to_string(),
            ship_type: ShipType::Passenger,
            status,
            crew_count,
            cargo_capacity: 0,
            arrival_time: None,
            departure_time: None,
        }
    }

    /// A section on deck 1.
    #[must_use]
    pub fn section(id: i64, max_capacity: i32, current_occupancy: i32) -> Section {
        Section {
            id: SectionId::new(id),
            name: format!("Section {id}"),
            deck: 1,
            max_capacity,
            current_occupancy,
        }
    }

    /// An active crew member.
    #[must_use]
    pub fn crew_member(id: i64, section: Option<i64>) -> CrewMember {
        CrewMember {
            id: CrewMemberId::new(id),
            name: format!("Crew {id}"),
            rank: "Ensign".to_string(),
            role: "Engineer".to_string(),
            section_id: section.map(SectionId::new),
            status: CrewStatus::Active,
        }
    }

    /// A pool.
    #[must_use]
    pub fn pool(id: &str) -> ResourcePool {
        ResourcePool {
            id: PoolId::new(id),
            name: format!("{id} grid"),
        }
    }

    /// An online fusion reactor.
    #[must_use]
    pub fn online_source(id: i64, pool: &str, max_output_kw: f64, current_output_kw: f64) -> PowerSource {
        PowerSource {
            id,
            pool_id: PoolId::new(pool),
            name: format!("Reactor {id}"),
            source_type: SourceType::FusionReactor,
            status: SourceStatus::Online,
            max_output_kw,
            current_output_kw,
        }
    }
}

/// Property-based testing strategies.
pub mod properties {
    use proptest::prelude::*;

    /// One relocation or capacity adjustment in a generated workload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SectionOp {
        /// Move crew member `member` to section `target`
        Relocate {
            /// Index into the crew roster
            member: usize,
            /// Index into the section list
            target: usize,
        },
        /// Adjust a section's occupancy
        Adjust {
            /// Index into the section list
            section: usize,
            /// Signed change
            delta: i32,
        },
    }

    /// Random section operations over `sections` sections and `crew` members.
    pub fn section_ops(
        sections: usize,
        crew: usize,
        len: usize,
    ) -> impl Strategy<Value = Vec<SectionOp>> {
        let op = prop_oneof![
            (0..crew, 0..sections)
                .prop_map(|(member, target)| SectionOp::Relocate { member, target }),
            (0..sections, -3i32..=3)
                .prop_map(|(section, delta)| SectionOp::Adjust { section, delta }),
        ];
        proptest::collection::vec(op, 1..=len)
    }
}

// Re-export commonly used items
pub use kv::InMemoryKeyValueStore;
pub use mocks::{FixedClock, test_clock};
pub use store::InMemoryStore;

/// Install a `tracing` subscriber for test output. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}
