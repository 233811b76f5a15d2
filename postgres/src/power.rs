//! Power store over `resource_pools`, `power_sources`, `power_allocations`
//! and `power_logs`.
//!
//! The pool row is the ledger's serialization point: every allocation
//! decision holds `FOR UPDATE` on it from the availability check to commit.

use crate::{db_err, limit};
use futures::future::BoxFuture;
use nexus_core::ids::{PoolId, SectionId};
use nexus_core::model::{
    Allocation, PowerAction, PowerLog, PowerSource, ResourcePool, SourceStatus, SourceType,
};
use nexus_core::store::{PowerStore, PowerTx, StoreResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const SOURCES_QUERY: &str = r"
    SELECT id, pool_id, name, source_type, status, max_output_kw, current_output_kw
    FROM power_sources
    WHERE pool_id = $1
    ORDER BY id
";

const ALLOCATIONS_QUERY: &str = r"
    SELECT pool_id, system_name, amount_kw, priority, section_id, allocated_at
    FROM power_allocations
    WHERE pool_id = $1
    ORDER BY priority, system_name
";

fn pool_from_row(row: &PgRow) -> StoreResult<ResourcePool> {
    Ok(ResourcePool {
        id: PoolId::new(row.try_get::<String, _>("id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
    })
}

fn source_from_row(row: &PgRow) -> StoreResult<PowerSource> {
    let source_type: String = row.try_get("source_type").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(PowerSource {
        id: row.try_get("id").map_err(db_err)?,
        pool_id: PoolId::new(row.try_get::<String, _>("pool_id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        source_type: SourceType::parse(&source_type)?,
        status: SourceStatus::parse(&status)?,
        max_output_kw: row.try_get("max_output_kw").map_err(db_err)?,
        current_output_kw: row.try_get("current_output_kw").map_err(db_err)?,
    })
}

fn allocation_from_row(row: &PgRow) -> StoreResult<Allocation> {
    Ok(Allocation {
        pool_id: PoolId::new(row.try_get::<String, _>("pool_id").map_err(db_err)?),
        system: row.try_get("system_name").map_err(db_err)?,
        amount_kw: row.try_get("amount_kw").map_err(db_err)?,
        priority: row.try_get("priority").map_err(db_err)?,
        section_id: row
            .try_get::<Option<i64>, _>("section_id")
            .map_err(db_err)?
            .map(SectionId::new),
        allocated_at: row.try_get("allocated_at").map_err(db_err)?,
    })
}

fn log_from_row(row: &PgRow) -> StoreResult<PowerLog> {
    let action: String = row.try_get("action").map_err(db_err)?;
    Ok(PowerLog {
        pool_id: PoolId::new(row.try_get::<String, _>("pool_id").map_err(db_err)?),
        system: row.try_get("system_name").map_err(db_err)?,
        action: PowerAction::parse(&action)?,
        amount_kw: row.try_get("amount_kw").map_err(db_err)?,
        timestamp: row.try_get("timestamp").map_err(db_err)?,
    })
}

/// `PostgreSQL` implementation of [`PowerStore`].
#[derive(Clone)]
pub struct PostgresPowerStore {
    pool: PgPool,
}

impl PostgresPowerStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PowerStore for PostgresPowerStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn PowerTx>>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(db_err)?;
            Ok(Box::new(PgPowerTx { tx }) as Box<dyn PowerTx>)
        })
    }

    fn pool(&self, id: &PoolId) -> BoxFuture<'_, StoreResult<Option<ResourcePool>>> {
        let id = id.clone();
        Box::pin(async move {
            sqlx::query("SELECT id, name FROM resource_pools WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .as_ref()
                .map(pool_from_row)
                .transpose()
        })
    }

    fn sources(&self, pool: &PoolId) -> BoxFuture<'_, StoreResult<Vec<PowerSource>>> {
        let pool = pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(SOURCES_QUERY)
                .bind(pool.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.iter().map(source_from_row).collect()
        })
    }

    fn allocations(&self, pool: &PoolId) -> BoxFuture<'_, StoreResult<Vec<Allocation>>> {
        let pool = pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(ALLOCATIONS_QUERY)
                .bind(pool.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.iter().map(allocation_from_row).collect()
        })
    }

    fn logs(&self, pool: &PoolId, n: usize) -> BoxFuture<'_, StoreResult<Vec<PowerLog>>> {
        let pool = pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT pool_id, system_name, action, amount_kw, timestamp
                FROM power_logs
                WHERE pool_id = $1
                ORDER BY timestamp DESC, id DESC
                LIMIT $2
                ",
            )
            .bind(pool.as_str())
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(log_from_row).collect()
        })
    }
}

struct PgPowerTx {
    tx: Transaction<'static, Postgres>,
}

impl PowerTx for PgPowerTx {
    fn lock_pool(&mut self, id: PoolId) -> BoxFuture<'_, StoreResult<Option<ResourcePool>>> {
        Box::pin(async move {
            sqlx::query("SELECT id, name FROM resource_pools WHERE id = $1 FOR UPDATE")
                .bind(id.as_str())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?
                .as_ref()
                .map(pool_from_row)
                .transpose()
        })
    }

    fn sources(&mut self, pool: PoolId) -> BoxFuture<'_, StoreResult<Vec<PowerSource>>> {
        Box::pin(async move {
            let rows = sqlx::query(SOURCES_QUERY)
                .bind(pool.as_str())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_err)?;
            rows.iter().map(source_from_row).collect()
        })
    }

    fn allocations(&mut self, pool: PoolId) -> BoxFuture<'_, StoreResult<Vec<Allocation>>> {
        Box::pin(async move {
            let rows = sqlx::query(ALLOCATIONS_QUERY)
                .bind(pool.as_str())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_err)?;
            rows.iter().map(allocation_from_row).collect()
        })
    }

    fn put_allocation(&mut self, allocation: Allocation) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO power_allocations
                    (pool_id, system_name, amount_kw, priority, section_id, allocated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (pool_id, system_name) DO UPDATE
                SET amount_kw = EXCLUDED.amount_kw,
                    priority = EXCLUDED.priority,
                    section_id = EXCLUDED.section_id,
                    allocated_at = EXCLUDED.allocated_at
                ",
            )
            .bind(allocation.pool_id.as_str())
            .bind(&allocation.system)
            .bind(allocation.amount_kw)
            .bind(allocation.priority)
            .bind(allocation.section_id.map(SectionId::get))
            .bind(allocation.allocated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn delete_allocation(
        &mut self,
        pool: PoolId,
        system: String,
    ) -> BoxFuture<'_, StoreResult<Option<Allocation>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                DELETE FROM power_allocations
                WHERE pool_id = $1 AND system_name = $2
                RETURNING pool_id, system_name, amount_kw, priority, section_id, allocated_at
                ",
            )
            .bind(pool.as_str())
            .bind(&system)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(allocation_from_row)
            .transpose()
        })
    }

    fn append_log(&mut self, entry: PowerLog) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO power_logs (pool_id, system_name, action, amount_kw, timestamp)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(entry.pool_id.as_str())
            .bind(&entry.system)
            .bind(entry.action.as_str())
            .bind(entry.amount_kw)
            .bind(entry.timestamp)
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
