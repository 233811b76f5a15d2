//! # Nexus Runtime
//!
//! Coordination services for the Nexus facility, written against the ports
//! in `nexus-core`.
//!
//! ## Core Components
//!
//! - **Capacity Ledger**: power allocations that never exceed pool output
//! - **Distributed Mutex**: TTL-bounded, token-checked cluster locks
//! - **Transition Trigger**: key expiry drives the return of departed ships
//! - **Docking Orchestrator**: the dock/undock saga across bays, power and crew
//! - **Capacity Guard**: section occupancy under row locks, with compensation
//! - **Aggregation Gateway**: fault-isolated fan-out over domain summaries
//!
//! ## Example
//!
//! ```ignore
//! use nexus_runtime::{CapacityGuard, CapacityGuardConfig};
//!
//! let guard = CapacityGuard::new(section_store, CapacityGuardConfig::default())
//!     .with_consumer(life_support);
//!
//! match guard.relocate(crew_member, target).await? {
//!     Outcome::Completed(moved) => println!("now {}", moved.occupancy),
//!     Outcome::Rejected(why) => println!("declined: {why}"),
//! }
//! ```

/// Dock and undock saga
pub mod docking;

/// Dashboard fan-out
pub mod gateway;

/// Power capacity ledger
pub mod ledger;

/// Distributed mutex over the key-value store
pub mod mutex;

/// Section occupancy guard
pub mod relocation;

/// Scheduled ship-return trigger
pub mod trigger;

pub use docking::{
    DeliveryRequest, DockingConfig, DockingEnvironment, DockingOrchestrator, DockingReceipt,
    UndockReceipt,
};
pub use gateway::{AggregationGateway, GatewayConfig, SummaryProviders, overall_status};
pub use ledger::{AllocationRequest, CapacityLedger, LedgerConfig, PoolStatus, SourceReport};
pub use mutex::{DistributedMutex, LockToken, LockWait};
pub use relocation::{CapacityGuard, CapacityGuardConfig, Relocation};
pub use trigger::{TransitionTrigger, TriggerConfig, TriggerOutcome};
