//! Relational store ports.
//!
//! Each store hands out transactions through `begin`. Inside a transaction,
//! `*_for_update` reads take an exclusive row lock that is held until
//! `commit` or `rollback`; dropping a transaction without committing rolls
//! it back. Reads on the store itself see committed data only.
//!
//! Callers that lock more than one row of the same kind lock them in
//! ascending id order.
//!
//! # Dyn Compatibility
//!
//! Like [`crate::kv::KeyValueStore`], these traits return boxed futures so
//! stores and transactions can be used as trait objects.

use crate::error::StoreError;
use crate::ids::{CrewMemberId, PoolId, SectionId, ShipId};
use crate::model::{
    Allocation, Bay, CrewMember, DockingLog, NewCrewMember, NewDockingLog, NewShip, PowerLog,
    PowerSource, ResourcePool, Section, Ship, ShipStatus,
};
use futures::future::BoxFuture;

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

// ═══════════════════════════════════════════════════════════════════════════
// Docking
// ═══════════════════════════════════════════════════════════════════════════

/// Persistence for bays, ships and docking audit records.
pub trait DockingStore: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection is available.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn DockingTx>>>;

    /// Committed view of a ship.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn ship(&self, id: ShipId) -> BoxFuture<'_, StoreResult<Option<Ship>>>;

    /// All ships, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn ships(&self) -> BoxFuture<'_, StoreResult<Vec<Ship>>>;

    /// Ships in `status`, ordered by arrival time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn ships_with_status(&self, status: ShipStatus) -> BoxFuture<'_, StoreResult<Vec<Ship>>>;

    /// All bays, ordered by bay number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn bays(&self) -> BoxFuture<'_, StoreResult<Vec<Bay>>>;

    /// Most recent audit records first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn logs(&self, limit: usize) -> BoxFuture<'_, StoreResult<Vec<DockingLog>>>;
}

/// A docking transaction.
pub trait DockingTx: Send {
    /// Lock and read a ship.
    fn ship_for_update(&mut self, id: ShipId) -> BoxFuture<'_, StoreResult<Option<Ship>>>;

    /// Lock and read the lowest-numbered `AVAILABLE` bay, skipping bays
    /// locked by concurrent transactions.
    fn first_available_bay_for_update(&mut self) -> BoxFuture<'_, StoreResult<Option<Bay>>>;

    /// Lock and read the bay occupied by `ship`.
    fn bay_occupied_by_for_update(
        &mut self,
        ship: ShipId,
    ) -> BoxFuture<'_, StoreResult<Option<Bay>>>;

    /// Write a bay.
    fn update_bay(&mut self, bay: Bay) -> BoxFuture<'_, StoreResult<()>>;

    /// Write a ship.
    fn update_ship(&mut self, ship: Ship) -> BoxFuture<'_, StoreResult<()>>;

    /// Insert a ship and return it with its id.
    fn insert_ship(&mut self, ship: NewShip) -> BoxFuture<'_, StoreResult<Ship>>;

    /// Append an audit record.
    fn append_log(&mut self, entry: NewDockingLog) -> BoxFuture<'_, StoreResult<()>>;

    /// Make all writes visible and release row locks.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;

    /// Discard all writes and release row locks.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Power
// ═══════════════════════════════════════════════════════════════════════════

/// Persistence for pools, sources, allocations and ledger audit records.
pub trait PowerStore: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection is available.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn PowerTx>>>;

    /// Committed view of a pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn pool(&self, id: &PoolId) -> BoxFuture<'_, StoreResult<Option<ResourcePool>>>;

    /// Sources of a pool, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn sources(&self, pool: &PoolId) -> BoxFuture<'_, StoreResult<Vec<PowerSource>>>;

    /// Allocations of a pool, highest priority (lowest number) first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn allocations(&self, pool: &PoolId) -> BoxFuture<'_, StoreResult<Vec<Allocation>>>;

    /// Most recent ledger audit records first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn logs(&self, pool: &PoolId, limit: usize) -> BoxFuture<'_, StoreResult<Vec<PowerLog>>>;
}

/// A ledger transaction.
pub trait PowerTx: Send {
    /// Lock a pool row, serializing every allocation decision on it.
    fn lock_pool(&mut self, id: PoolId) -> BoxFuture<'_, StoreResult<Option<ResourcePool>>>;

    /// Sources of a pool as seen by this transaction.
    fn sources(&mut self, pool: PoolId) -> BoxFuture<'_, StoreResult<Vec<PowerSource>>>;

    /// Allocations of a pool as seen by this transaction.
    fn allocations(&mut self, pool: PoolId) -> BoxFuture<'_, StoreResult<Vec<Allocation>>>;

    /// Insert or replace the allocation keyed by `(pool_id, system)`.
    fn put_allocation(&mut self, allocation: Allocation) -> BoxFuture<'_, StoreResult<()>>;

    /// Remove an allocation, returning it if it existed.
    fn delete_allocation(
        &mut self,
        pool: PoolId,
        system: String,
    ) -> BoxFuture<'_, StoreResult<Option<Allocation>>>;

    /// Append an audit record.
    fn append_log(&mut self, entry: PowerLog) -> BoxFuture<'_, StoreResult<()>>;

    /// Make all writes visible and release row locks.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;

    /// Discard all writes and release row locks.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════════════════════

/// Persistence for sections and the crew assigned to them.
pub trait SectionStore: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection is available.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn SectionTx>>>;

    /// Committed view of a section.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn section(&self, id: SectionId) -> BoxFuture<'_, StoreResult<Option<Section>>>;

    /// All sections, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn sections(&self) -> BoxFuture<'_, StoreResult<Vec<Section>>>;

    /// All crew members, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn crew_members(&self) -> BoxFuture<'_, StoreResult<Vec<CrewMember>>>;
}

/// A section transaction.
pub trait SectionTx: Send {
    /// Lock and read a crew member.
    fn crew_member_for_update(
        &mut self,
        id: CrewMemberId,
    ) -> BoxFuture<'_, StoreResult<Option<CrewMember>>>;

    /// Lock and read a section.
    fn section_for_update(&mut self, id: SectionId) -> BoxFuture<'_, StoreResult<Option<Section>>>;

    /// Lock and read the lowest-id section with room for `needed` more
    /// occupants, skipping sections locked by concurrent transactions.
    fn section_with_room_for_update(
        &mut self,
        needed: i32,
    ) -> BoxFuture<'_, StoreResult<Option<Section>>>;

    /// Write a section.
    fn update_section(&mut self, section: Section) -> BoxFuture<'_, StoreResult<()>>;

    /// Write a crew member.
    fn update_crew_member(&mut self, member: CrewMember) -> BoxFuture<'_, StoreResult<()>>;

    /// Insert a crew member and return it with its id.
    fn insert_crew_member(&mut self, member: NewCrewMember) -> BoxFuture<'_, StoreResult<CrewMember>>;

    /// Make all writes visible and release row locks.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;

    /// Discard all writes and release row locks.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;
}
