//! In-memory relational store with real row locks.
//!
//! [`InMemoryStore`] implements every store port. Transactions behave like
//! their `PostgreSQL` counterparts closely enough to test concurrency:
//!
//! - `*_for_update` takes a per-row `tokio::sync::Mutex` held until commit,
//!   rollback or drop
//! - `first_available_bay_for_update` skips rows locked by others
//!   (`SKIP LOCKED`)
//! - writes are staged and only become visible on commit

use futures::future::BoxFuture;
use nexus_core::ids::{BayId, CrewMemberId, PoolId, SectionId, ShipId};
use nexus_core::model::{
    Allocation, Bay, BayStatus, CrewMember, DockingLog, NewCrewMember, NewDockingLog, NewShip,
    PowerLog, PowerSource, ResourcePool, Section, Ship, ShipStatus,
};
use nexus_core::store::{
    DockingStore, DockingTx, PowerStore, PowerTx, SectionStore, SectionTx, StoreResult,
};
use nexus_core::StoreError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct Tables {
    ships: BTreeMap<ShipId, Ship>,
    bays: BTreeMap<BayId, Bay>,
    docking_logs: Vec<DockingLog>,
    pools: BTreeMap<PoolId, ResourcePool>,
    sources: Vec<PowerSource>,
    allocations: BTreeMap<(PoolId, String), Allocation>,
    power_logs: Vec<PowerLog>,
    sections: BTreeMap<SectionId, Section>,
    crew: BTreeMap<CrewMemberId, CrewMember>,
    next_ship_id: i64,
    next_crew_id: i64,
    next_log_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    fail_begin: bool,
    fail_commit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Ship(ShipId),
    Bay(BayId),
    Pool(PoolId),
    Section(SectionId),
    Crew(CrewMemberId),
}

/// In-memory implementation of the docking, power and section stores.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: &RowKey) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn new_tx(&self) -> StoreResult<InMemoryTx> {
        if self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_begin
        {
            return Err(StoreError::Database("connection pool exhausted".into()));
        }
        Ok(InMemoryTx {
            store: self.clone(),
            guards: HashMap::new(),
            staged: Staged::default(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Fault injection
    // ═══════════════════════════════════════════════════════════════════════

    /// Make `begin` fail until reset.
    pub fn set_begin_failure(&self, fail: bool) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_begin = fail;
    }

    /// Make `commit` fail (discarding the staged writes) until reset.
    pub fn set_commit_failure(&self, fail: bool) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_commit = fail;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Seeding
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert or replace a bay.
    pub fn insert_bay(&self, bay: Bay) {
        self.tables().bays.insert(bay.id, bay);
    }

    /// Insert or replace a ship.
    pub fn insert_ship(&self, ship: Ship) {
        let mut tables = self.tables();
        tables.next_ship_id = tables.next_ship_id.max(ship.id.get());
        tables.ships.insert(ship.id, ship);
    }

    /// Insert or replace a pool.
    pub fn insert_pool(&self, pool: ResourcePool) {
        self.tables().pools.insert(pool.id.clone(), pool);
    }

    /// Add a power source.
    pub fn insert_source(&self, source: PowerSource) {
        self.tables().sources.push(source);
    }

    /// Insert or replace an allocation.
    pub fn insert_allocation(&self, allocation: Allocation) {
        self.tables().allocations.insert(
            (allocation.pool_id.clone(), allocation.system.clone()),
            allocation,
        );
    }

    /// Insert or replace a section.
    pub fn insert_section(&self, section: Section) {
        self.tables().sections.insert(section.id, section);
    }

    /// Insert or replace a crew member.
    pub fn insert_crew_member(&self, member: CrewMember) {
        let mut tables = self.tables();
        tables.next_crew_id = tables.next_crew_id.max(member.id.get());
        tables.crew.insert(member.id, member);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection (committed state)
    // ═══════════════════════════════════════════════════════════════════════

    /// Committed bay row.
    #[must_use]
    pub fn bay_row(&self, id: BayId) -> Option<Bay> {
        self.tables().bays.get(&id).cloned()
    }

    /// All committed bay rows.
    #[must_use]
    pub fn bay_rows(&self) -> Vec<Bay> {
        self.tables().bays.values().cloned().collect()
    }

    /// Committed ship row.
    #[must_use]
    pub fn ship_row(&self, id: ShipId) -> Option<Ship> {
        self.tables().ships.get(&id).cloned()
    }

    /// Committed section row.
    #[must_use]
    pub fn section_row(&self, id: SectionId) -> Option<Section> {
        self.tables().sections.get(&id).cloned()
    }

    /// All committed crew member rows.
    #[must_use]
    pub fn crew_member_rows(&self) -> Vec<CrewMember> {
        self.tables().crew.values().cloned().collect()
    }

    /// Committed crew member row.
    #[must_use]
    pub fn crew_member_row(&self, id: CrewMemberId) -> Option<CrewMember> {
        self.tables().crew.get(&id).cloned()
    }

    /// Committed allocation row.
    #[must_use]
    pub fn allocation_row(&self, pool: &PoolId, system: &str) -> Option<Allocation> {
        self.tables()
            .allocations
            .get(&(pool.clone(), system.to_string()))
            .cloned()
    }

    /// Committed docking audit records, oldest first.
    #[must_use]
    pub fn docking_log_rows(&self) -> Vec<DockingLog> {
        self.tables().docking_logs.clone()
    }

    /// Committed ledger audit records, oldest first.
    #[must_use]
    pub fn power_log_rows(&self) -> Vec<PowerLog> {
        self.tables().power_logs.clone()
    }
}

/// Writes staged by an open transaction.
#[derive(Debug, Default)]
struct Staged {
    ships: BTreeMap<ShipId, Ship>,
    bays: BTreeMap<BayId, Bay>,
    docking_logs: Vec<NewDockingLog>,
    allocations: BTreeMap<(PoolId, String), Option<Allocation>>,
    power_logs: Vec<PowerLog>,
    sections: BTreeMap<SectionId, Section>,
    crew: BTreeMap<CrewMemberId, CrewMember>,
}

/// Transaction over an [`InMemoryStore`].
struct InMemoryTx {
    store: InMemoryStore,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
}

impl InMemoryTx {
    async fn lock_row(&mut self, key: RowKey) {
        if self.guards.contains_key(&key) {
            return;
        }
        let guard = self.store.row_lock(&key).lock_owned().await;
        self.guards.insert(key, guard);
    }

    fn try_lock_row(&mut self, key: RowKey) -> bool {
        if self.guards.contains_key(&key) {
            return true;
        }
        match self.store.row_lock(&key).try_lock_owned() {
            Ok(guard) => {
                self.guards.insert(key, guard);
                true
            }
            Err(_) => false,
        }
    }

    fn unlock_row(&mut self, key: &RowKey) {
        self.guards.remove(key);
    }

    fn ship(&self, id: ShipId) -> Option<Ship> {
        self.staged
            .ships
            .get(&id)
            .cloned()
            .or_else(|| self.store.tables().ships.get(&id).cloned())
    }

    fn bay(&self, id: BayId) -> Option<Bay> {
        self.staged
            .bays
            .get(&id)
            .cloned()
            .or_else(|| self.store.tables().bays.get(&id).cloned())
    }

    fn bays(&self) -> Vec<Bay> {
        let mut bays: BTreeMap<BayId, Bay> = self.store.tables().bays.clone();
        for (id, bay) in &self.staged.bays {
            bays.insert(*id, bay.clone());
        }
        let mut bays: Vec<Bay> = bays.into_values().collect();
        bays.sort_by_key(|b| b.bay_number);
        bays
    }

    fn section(&self, id: SectionId) -> Option<Section> {
        self.staged
            .sections
            .get(&id)
            .cloned()
            .or_else(|| self.store.tables().sections.get(&id).cloned())
    }

    fn sections(&self) -> Vec<Section> {
        let mut sections: BTreeMap<SectionId, Section> = self.store.tables().sections.clone();
        for (id, section) in &self.staged.sections {
            sections.insert(*id, section.clone());
        }
        sections.into_values().collect()
    }

    fn crew_member(&self, id: CrewMemberId) -> Option<CrewMember> {
        self.staged
            .crew
            .get(&id)
            .cloned()
            .or_else(|| self.store.tables().crew.get(&id).cloned())
    }

    fn allocations(&self, pool: &PoolId) -> Vec<Allocation> {
        let mut merged: BTreeMap<(PoolId, String), Allocation> = self
            .store
            .tables()
            .allocations
            .iter()
            .filter(|((p, _), _)| p == pool)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, staged) in &self.staged.allocations {
            if &key.0 != pool {
                continue;
            }
            match staged {
                Some(allocation) => {
                    merged.insert(key.clone(), allocation.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        let mut allocations: Vec<Allocation> = merged.into_values().collect();
        allocations.sort_by_key(|a| a.priority);
        allocations
    }

    fn apply(self) -> StoreResult<()> {
        let Self {
            store,
            guards,
            staged,
        } = self;

        if store
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_commit
        {
            drop(guards);
            return Err(StoreError::Database("commit failed".into()));
        }

        {
            let mut tables = store.tables();
            tables.ships.extend(staged.ships);
            tables.bays.extend(staged.bays);
            for entry in staged.docking_logs {
                tables.next_log_id += 1;
                let id = tables.next_log_id;
                tables.docking_logs.push(DockingLog {
                    id,
                    ship_id: entry.ship_id,
                    bay_id: entry.bay_id,
                    action: entry.action,
                    timestamp: entry.timestamp,
                    details: entry.details,
                });
            }
            for (key, allocation) in staged.allocations {
                match allocation {
                    Some(allocation) => {
                        tables.allocations.insert(key, allocation);
                    }
                    None => {
                        tables.allocations.remove(&key);
                    }
                }
            }
            tables.power_logs.extend(staged.power_logs);
            tables.sections.extend(staged.sections);
            tables.crew.extend(staged.crew);
        }

        // Locks are released only after the writes are visible.
        drop(guards);
        Ok(())
    }
}

fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, T> {
    Box::pin(async move { value })
}

// ═══════════════════════════════════════════════════════════════════════════
// Docking
// ═══════════════════════════════════════════════════════════════════════════

impl DockingStore for InMemoryStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn DockingTx>>> {
        let tx = self.new_tx().map(|tx| Box::new(tx) as Box<dyn DockingTx>);
        ready(tx)
    }

    fn ship(&self, id: ShipId) -> BoxFuture<'_, StoreResult<Option<Ship>>> {
        ready(Ok(self.ship_row(id)))
    }

    fn ships(&self) -> BoxFuture<'_, StoreResult<Vec<Ship>>> {
        ready(Ok(self.tables().ships.values().cloned().collect()))
    }

    fn ships_with_status(&self, status: ShipStatus) -> BoxFuture<'_, StoreResult<Vec<Ship>>> {
        let mut ships: Vec<Ship> = self
            .tables()
            .ships
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        ships.sort_by_key(|s| s.arrival_time);
        ready(Ok(ships))
    }

    fn bays(&self) -> BoxFuture<'_, StoreResult<Vec<Bay>>> {
        let mut bays = self.bay_rows();
        bays.sort_by_key(|b| b.bay_number);
        ready(Ok(bays))
    }

    fn logs(&self, limit: usize) -> BoxFuture<'_, StoreResult<Vec<DockingLog>>> {
        let logs = self
            .tables()
            .docking_logs
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect();
        ready(Ok(logs))
    }
}

impl DockingTx for InMemoryTx {
    fn ship_for_update(&mut self, id: ShipId) -> BoxFuture<'_, StoreResult<Option<Ship>>> {
        Box::pin(async move {
            if self.ship(id).is_none() {
                return Ok(None);
            }
            self.lock_row(RowKey::Ship(id)).await;
            Ok(self.ship(id))
        })
    }

    fn first_available_bay_for_update(&mut self) -> BoxFuture<'_, StoreResult<Option<Bay>>> {
        Box::pin(async move {
            let candidates: Vec<BayId> = self
                .bays()
                .into_iter()
                .filter(|b| b.status == BayStatus::Available)
                .map(|b| b.id)
                .collect();

            for id in candidates {
                let key = RowKey::Bay(id);
                let newly_locked = !self.guards.contains_key(&key);
                if !self.try_lock_row(key.clone()) {
                    continue;
                }
                match self.bay(id) {
                    Some(bay) if bay.status == BayStatus::Available => return Ok(Some(bay)),
                    _ if newly_locked => self.unlock_row(&key),
                    _ => {}
                }
            }
            Ok(None)
        })
    }

    fn bay_occupied_by_for_update(
        &mut self,
        ship: ShipId,
    ) -> BoxFuture<'_, StoreResult<Option<Bay>>> {
        Box::pin(async move {
            let Some(id) = self
                .bays()
                .into_iter()
                .find(|b| b.occupant == Some(ship))
                .map(|b| b.id)
            else {
                return Ok(None);
            };
            self.lock_row(RowKey::Bay(id)).await;
            Ok(self.bay(id).filter(|b| b.occupant == Some(ship)))
        })
    }

    fn update_bay(&mut self, bay: Bay) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.bays.insert(bay.id, bay);
        ready(Ok(()))
    }

    fn update_ship(&mut self, ship: Ship) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.ships.insert(ship.id, ship);
        ready(Ok(()))
    }

    fn insert_ship(&mut self, ship: NewShip) -> BoxFuture<'_, StoreResult<Ship>> {
        let id = {
            let mut tables = self.store.tables();
            tables.next_ship_id += 1;
            ShipId::new(tables.next_ship_id)
        };
        let ship = Ship {
            id,
            name: ship.name,
            ship_type: ship.ship_type,
            status: ship.status,
            crew_count: ship.crew_count,
            cargo_capacity: ship.cargo_capacity,
            arrival_time: ship.arrival_time,
            departure_time: None,
        };
        self.staged.ships.insert(id, ship.clone());
        ready(Ok(ship))
    }

    fn append_log(&mut self, entry: NewDockingLog) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.docking_logs.push(entry);
        ready(Ok(()))
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        ready((*self).apply())
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        drop(self);
        ready(Ok(()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Power
// ═══════════════════════════════════════════════════════════════════════════

impl PowerStore for InMemoryStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn PowerTx>>> {
        let tx = self.new_tx().map(|tx| Box::new(tx) as Box<dyn PowerTx>);
        ready(tx)
    }

    fn pool(&self, id: &PoolId) -> BoxFuture<'_, StoreResult<Option<ResourcePool>>> {
        ready(Ok(self.tables().pools.get(id).cloned()))
    }

    fn sources(&self, pool: &PoolId) -> BoxFuture<'_, StoreResult<Vec<PowerSource>>> {
        let mut sources: Vec<PowerSource> = self
            .tables()
            .sources
            .iter()
            .filter(|s| &s.pool_id == pool)
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.id);
        ready(Ok(sources))
    }

    fn allocations(&self, pool: &PoolId) -> BoxFuture<'_, StoreResult<Vec<Allocation>>> {
        let mut allocations: Vec<Allocation> = self
            .tables()
            .allocations
            .values()
            .filter(|a| &a.pool_id == pool)
            .cloned()
            .collect();
        allocations.sort_by_key(|a| a.priority);
        ready(Ok(allocations))
    }

    fn logs(&self, pool: &PoolId, limit: usize) -> BoxFuture<'_, StoreResult<Vec<PowerLog>>> {
        let logs = self
            .tables()
            .power_logs
            .iter()
            .rev()
            .filter(|l| &l.pool_id == pool)
            .take(limit)
            .cloned()
            .collect();
        ready(Ok(logs))
    }
}

impl PowerTx for InMemoryTx {
    fn lock_pool(&mut self, id: PoolId) -> BoxFuture<'_, StoreResult<Option<ResourcePool>>> {
        Box::pin(async move {
            if !self.store.tables().pools.contains_key(&id) {
                return Ok(None);
            }
            self.lock_row(RowKey::Pool(id.clone())).await;
            Ok(self.store.tables().pools.get(&id).cloned())
        })
    }

    fn sources(&mut self, pool: PoolId) -> BoxFuture<'_, StoreResult<Vec<PowerSource>>> {
        let mut sources: Vec<PowerSource> = self
            .store
            .tables()
            .sources
            .iter()
            .filter(|s| s.pool_id == pool)
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.id);
        ready(Ok(sources))
    }

    fn allocations(&mut self, pool: PoolId) -> BoxFuture<'_, StoreResult<Vec<Allocation>>> {
        ready(Ok(InMemoryTx::allocations(self, &pool)))
    }

    fn put_allocation(&mut self, allocation: Allocation) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.allocations.insert(
            (allocation.pool_id.clone(), allocation.system.clone()),
            Some(allocation),
        );
        ready(Ok(()))
    }

    fn delete_allocation(
        &mut self,
        pool: PoolId,
        system: String,
    ) -> BoxFuture<'_, StoreResult<Option<Allocation>>> {
        let existing = InMemoryTx::allocations(self, &pool)
            .into_iter()
            .find(|a| a.system == system);
        if existing.is_some() {
            self.staged.allocations.insert((pool, system), None);
        }
        ready(Ok(existing))
    }

    fn append_log(&mut self, entry: PowerLog) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.power_logs.push(entry);
        ready(Ok(()))
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        ready((*self).apply())
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        drop(self);
        ready(Ok(()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════════════════════

impl SectionStore for InMemoryStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn SectionTx>>> {
        let tx = self.new_tx().map(|tx| Box::new(tx) as Box<dyn SectionTx>);
        ready(tx)
    }

    fn section(&self, id: SectionId) -> BoxFuture<'_, StoreResult<Option<Section>>> {
        ready(Ok(self.section_row(id)))
    }

    fn sections(&self) -> BoxFuture<'_, StoreResult<Vec<Section>>> {
        ready(Ok(self.tables().sections.values().cloned().collect()))
    }

    fn crew_members(&self) -> BoxFuture<'_, StoreResult<Vec<CrewMember>>> {
        ready(Ok(self.tables().crew.values().cloned().collect()))
    }
}

impl SectionTx for InMemoryTx {
    fn crew_member_for_update(
        &mut self,
        id: CrewMemberId,
    ) -> BoxFuture<'_, StoreResult<Option<CrewMember>>> {
        Box::pin(async move {
            if self.crew_member(id).is_none() {
                return Ok(None);
            }
            self.lock_row(RowKey::Crew(id)).await;
            Ok(self.crew_member(id))
        })
    }

    fn section_for_update(&mut self, id: SectionId) -> BoxFuture<'_, StoreResult<Option<Section>>> {
        Box::pin(async move {
            if self.section(id).is_none() {
                return Ok(None);
            }
            self.lock_row(RowKey::Section(id)).await;
            Ok(self.section(id))
        })
    }

    fn section_with_room_for_update(
        &mut self,
        needed: i32,
    ) -> BoxFuture<'_, StoreResult<Option<Section>>> {
        Box::pin(async move {
            let fits = |s: &Section| s.current_occupancy + needed <= s.max_capacity;
            let candidates: Vec<SectionId> = self
                .sections()
                .into_iter()
                .filter(|s| fits(s))
                .map(|s| s.id)
                .collect();

            for id in candidates {
                let key = RowKey::Section(id);
                let newly_locked = !self.guards.contains_key(&key);
                if !self.try_lock_row(key.clone()) {
                    continue;
                }
                match self.section(id) {
                    Some(section) if fits(&section) => return Ok(Some(section)),
                    _ if newly_locked => self.unlock_row(&key),
                    _ => {}
                }
            }
            Ok(None)
        })
    }

    fn update_section(&mut self, section: Section) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.sections.insert(section.id, section);
        ready(Ok(()))
    }

    fn update_crew_member(&mut self, member: CrewMember) -> BoxFuture<'_, StoreResult<()>> {
        self.staged.crew.insert(member.id, member);
        ready(Ok(()))
    }

    fn insert_crew_member(&mut self, member: NewCrewMember) -> BoxFuture<'_, StoreResult<CrewMember>> {
        let id = {
            let mut tables = self.store.tables();
            tables.next_crew_id += 1;
            CrewMemberId::new(tables.next_crew_id)
        };
        let member = CrewMember {
            id,
            name: member.name,
            rank: member.rank,
            role: member.role,
            section_id: member.section_id,
            status: member.status,
        };
        self.staged.crew.insert(id, member.clone());
        ready(Ok(member))
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        ready((*self).apply())
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        drop(self);
        ready(Ok(()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::time::Duration;

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        store.insert_section(fixtures::section(1, 10, 2));

        let mut tx = SectionStore::begin(&store).await.unwrap();
        let mut section = tx.section_for_update(SectionId::new(1)).await.unwrap().unwrap();
        section.current_occupancy = 3;
        tx.update_section(section).await.unwrap();

        assert_eq!(store.section_row(SectionId::new(1)).unwrap().current_occupancy, 2);
        tx.commit().await.unwrap();
        assert_eq!(store.section_row(SectionId::new(1)).unwrap().current_occupancy, 3);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes_and_releases_lock() {
        let store = InMemoryStore::new();
        store.insert_section(fixtures::section(1, 10, 2));

        {
            let mut tx = SectionStore::begin(&store).await.unwrap();
            let mut section = tx.section_for_update(SectionId::new(1)).await.unwrap().unwrap();
            section.current_occupancy = 9;
            tx.update_section(section).await.unwrap();
        }

        let mut tx = SectionStore::begin(&store).await.unwrap();
        let section = tokio::time::timeout(
            Duration::from_secs(1),
            tx.section_for_update(SectionId::new(1)),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        assert_eq!(section.current_occupancy, 2);
    }

    #[tokio::test]
    async fn row_lock_blocks_second_writer_until_commit() {
        let store = InMemoryStore::new();
        store.insert_section(fixtures::section(1, 10, 0));

        let mut first = SectionStore::begin(&store).await.unwrap();
        first.section_for_update(SectionId::new(1)).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = SectionStore::begin(&store).await.unwrap();
                tx.section_for_update(SectionId::new(1)).await.unwrap().unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let mut section = store.section_row(SectionId::new(1)).unwrap();
        section.current_occupancy = 1;
        first.update_section(section).await.unwrap();
        first.commit().await.unwrap();

        let seen = contender.await.unwrap();
        assert_eq!(seen.current_occupancy, 1);
    }

    #[tokio::test]
    async fn available_bay_search_skips_locked_rows() {
        let store = InMemoryStore::new();
        store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        store.insert_bay(fixtures::bay(2, 2, BayStatus::Available));

        let mut first = DockingStore::begin(&store).await.unwrap();
        let mut second = DockingStore::begin(&store).await.unwrap();

        let a = first.first_available_bay_for_update().await.unwrap().unwrap();
        let b = second.first_available_bay_for_update().await.unwrap().unwrap();
        assert_eq!(a.id, BayId::new(1));
        assert_eq!(b.id, BayId::new(2));

        let mut third = DockingStore::begin(&store).await.unwrap();
        assert!(third.first_available_bay_for_update().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_failure_discards_writes() {
        let store = InMemoryStore::new();
        store.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
        store.set_commit_failure(true);

        let mut tx = DockingStore::begin(&store).await.unwrap();
        let mut bay = tx.first_available_bay_for_update().await.unwrap().unwrap();
        bay.occupy(ShipId::new(5));
        tx.update_bay(bay).await.unwrap();

        assert!(tx.commit().await.is_err());
        assert_eq!(store.bay_row(BayId::new(1)).unwrap().status, BayStatus::Available);
    }
}
