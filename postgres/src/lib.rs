//! `PostgreSQL` stores for the Nexus coordination core.
//!
//! Implements the store ports of `nexus-core` on a shared [`PgPool`]:
//!
//! - [`PostgresDockingStore`]: bays, ships and the docking audit trail
//! - [`PostgresPowerStore`]: pools, sources, allocations and the ledger audit trail
//! - [`PostgresSectionStore`]: sections and their occupants, over either the
//!   crew or the life-support tables ([`SectionTable`])
//!
//! Row locks are `SELECT ... FOR UPDATE`; searches for a free row add
//! `SKIP LOCKED` so concurrent callers never wait on each other's candidate.
//! A transaction dropped without commit is rolled back by sqlx.
//!
//! # Example
//!
//! ```ignore
//! use nexus_postgres::{PostgresDockingStore, apply_schema, connect};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/nexus", 10).await?;
//!     apply_schema(&pool).await?;
//!     let docking = PostgresDockingStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod docking;
pub mod power;
pub mod schema;
pub mod sections;

pub use docking::PostgresDockingStore;
pub use power::PostgresPowerStore;
pub use schema::{apply_schema, seed_facility};
pub use sections::{PostgresSectionStore, SectionTable};

use nexus_core::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the database is unreachable.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(db_err)
}

/// SQLSTATE `lock_not_available`.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Map a sqlx error onto the store port. An exhausted pool and a refused row
/// lock are both [`StoreError::LockUnavailable`], which callers see as a
/// retryable lock timeout.
pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(e.to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::LockUnavailable("connection pool".to_string()),
        sqlx::Error::Database(ref db) if is_lock_not_available(db.code().as_deref()) => {
            StoreError::LockUnavailable(db.message().to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn is_lock_not_available(sqlstate: Option<&str>) -> bool {
    sqlstate == Some(LOCK_NOT_AVAILABLE)
}

pub(crate) fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_lock_unavailable() {
        assert_eq!(
            db_err(sqlx::Error::PoolTimedOut),
            StoreError::LockUnavailable("connection pool".to_string())
        );
    }

    #[test]
    fn only_lock_not_available_sqlstate_is_a_lock_failure() {
        assert!(is_lock_not_available(Some("55P03")));
        assert!(!is_lock_not_available(Some("40P01")));
        assert!(!is_lock_not_available(Some("23505")));
        assert!(!is_lock_not_available(None));
    }

    #[test]
    fn other_failures_stay_database_errors() {
        assert!(matches!(
            db_err(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
        assert!(matches!(
            db_err(sqlx::Error::PoolClosed),
            StoreError::Database(_)
        ));
    }
}
