//! Docking store over `docking_bays`, `ships` and `docking_logs`.

use crate::{db_err, limit};
use futures::future::BoxFuture;
use nexus_core::ids::{BayId, ShipId};
use nexus_core::model::{
    Bay, BayStatus, DockingAction, DockingLog, NewDockingLog, NewShip, Ship, ShipStatus, ShipType,
};
use nexus_core::store::{DockingStore, DockingTx, StoreResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const BAY_COLUMNS: &str = "id, bay_number, status, current_ship_id, capacity";
const SHIP_COLUMNS: &str =
    "id, name, ship_type, status, crew_count, cargo_capacity, arrival_time, departure_time";

fn bay_from_row(row: &PgRow) -> StoreResult<Bay> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Bay {
        id: BayId::new(row.try_get("id").map_err(db_err)?),
        bay_number: row.try_get("bay_number").map_err(db_err)?,
        status: BayStatus::parse(&status)?,
        occupant: row
            .try_get::<Option<i64>, _>("current_ship_id")
            .map_err(db_err)?
            .map(ShipId::new),
        capacity: row.try_get("capacity").map_err(db_err)?,
    })
}

fn ship_from_row(row: &PgRow) -> StoreResult<Ship> {
    let ship_type: String = row.try_get("ship_type").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Ship {
        id: ShipId::new(row.try_get("id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        ship_type: ShipType::parse(&ship_type)?,
        status: ShipStatus::parse(&status)?,
        crew_count: row.try_get("crew_count").map_err(db_err)?,
        cargo_capacity: row.try_get("cargo_capacity").map_err(db_err)?,
        arrival_time: row.try_get("arrival_time").map_err(db_err)?,
        departure_time: row.try_get("departure_time").map_err(db_err)?,
    })
}

fn log_from_row(row: &PgRow) -> StoreResult<DockingLog> {
    let action: String = row.try_get("action").map_err(db_err)?;
    Ok(DockingLog {
        id: row.try_get("id").map_err(db_err)?,
        ship_id: ShipId::new(row.try_get("ship_id").map_err(db_err)?),
        bay_id: row
            .try_get::<Option<i64>, _>("bay_id")
            .map_err(db_err)?
            .map(BayId::new),
        action: DockingAction::parse(&action)?,
        timestamp: row.try_get("timestamp").map_err(db_err)?,
        details: row.try_get("details").map_err(db_err)?,
    })
}

/// `PostgreSQL` implementation of [`DockingStore`].
#[derive(Clone)]
pub struct PostgresDockingStore {
    pool: PgPool,
}

impl PostgresDockingStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DockingStore for PostgresDockingStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn DockingTx>>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(db_err)?;
            Ok(Box::new(PgDockingTx { tx }) as Box<dyn DockingTx>)
        })
    }

    fn ship(&self, id: ShipId) -> BoxFuture<'_, StoreResult<Option<Ship>>> {
        Box::pin(async move {
            sqlx::query(&format!("SELECT {SHIP_COLUMNS} FROM ships WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .as_ref()
                .map(ship_from_row)
                .transpose()
        })
    }

    fn ships(&self) -> BoxFuture<'_, StoreResult<Vec<Ship>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!("SELECT {SHIP_COLUMNS} FROM ships ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.iter().map(ship_from_row).collect()
        })
    }

    fn ships_with_status(&self, status: ShipStatus) -> BoxFuture<'_, StoreResult<Vec<Ship>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {SHIP_COLUMNS} FROM ships WHERE status = $1 ORDER BY arrival_time NULLS LAST, id"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(ship_from_row).collect()
        })
    }

    fn bays(&self) -> BoxFuture<'_, StoreResult<Vec<Bay>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {BAY_COLUMNS} FROM docking_bays ORDER BY bay_number"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(bay_from_row).collect()
        })
    }

    fn logs(&self, n: usize) -> BoxFuture<'_, StoreResult<Vec<DockingLog>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, ship_id, bay_id, action, timestamp, details
                FROM docking_logs
                ORDER BY timestamp DESC, id DESC
                LIMIT $1
                ",
            )
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(log_from_row).collect()
        })
    }
}

struct PgDockingTx {
    tx: Transaction<'static, Postgres>,
}

impl DockingTx for PgDockingTx {
    fn ship_for_update(&mut self, id: ShipId) -> BoxFuture<'_, StoreResult<Option<Ship>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {SHIP_COLUMNS} FROM ships WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(ship_from_row)
            .transpose()
        })
    }

    fn first_available_bay_for_update(&mut self) -> BoxFuture<'_, StoreResult<Option<Bay>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                r"
                SELECT {BAY_COLUMNS} FROM docking_bays
                WHERE status = 'AVAILABLE'
                ORDER BY bay_number
                LIMIT 1
                FOR UPDATE SKIP LOCKED
                "
            ))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(bay_from_row)
            .transpose()
        })
    }

    fn bay_occupied_by_for_update(
        &mut self,
        ship: ShipId,
    ) -> BoxFuture<'_, StoreResult<Option<Bay>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {BAY_COLUMNS} FROM docking_bays WHERE current_ship_id = $1 FOR UPDATE"
            ))
            .bind(ship.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(bay_from_row)
            .transpose()
        })
    }

    fn update_bay(&mut self, bay: Bay) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE docking_bays SET status = $2, current_ship_id = $3, capacity = $4 WHERE id = $1",
            )
            .bind(bay.id.get())
            .bind(bay.status.as_str())
            .bind(bay.occupant.map(ShipId::get))
            .bind(bay.capacity)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn update_ship(&mut self, ship: Ship) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE ships
                SET name = $2, ship_type = $3, status = $4, crew_count = $5,
                    cargo_capacity = $6, arrival_time = $7, departure_time = $8
                WHERE id = $1
                ",
            )
            .bind(ship.id.get())
            .bind(&ship.name)
            .bind(ship.ship_type.as_str())
            .bind(ship.status.as_str())
            .bind(ship.crew_count)
            .bind(ship.cargo_capacity)
            .bind(ship.arrival_time)
            .bind(ship.departure_time)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn insert_ship(&mut self, ship: NewShip) -> BoxFuture<'_, StoreResult<Ship>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                r"
                INSERT INTO ships (name, ship_type, status, crew_count, cargo_capacity, arrival_time)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {SHIP_COLUMNS}
                "
            ))
            .bind(&ship.name)
            .bind(ship.ship_type.as_str())
            .bind(ship.status.as_str())
            .bind(ship.crew_count)
            .bind(ship.cargo_capacity)
            .bind(ship.arrival_time)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
            ship_from_row(&row)
        })
    }

    fn append_log(&mut self, entry: NewDockingLog) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO docking_logs (ship_id, bay_id, action, timestamp, details)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(entry.ship_id.get())
            .bind(entry.bay_id.map(BayId::get))
            .bind(entry.action.as_str())
            .bind(entry.timestamp)
            .bind(&entry.details)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move { self.tx.commit().await.map_err(db_err) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move { self.tx.rollback().await.map_err(db_err) })
    }
}
