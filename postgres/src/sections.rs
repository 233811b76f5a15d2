//! Section store over a section table and its occupant table.
//!
//! The crew and life-support guards keep separate occupancy books for the
//! same physical sections, so one implementation serves both table pairs.

use crate::db_err;
use futures::future::BoxFuture;
use nexus_core::ids::{CrewMemberId, SectionId};
use nexus_core::model::{CrewMember, CrewStatus, NewCrewMember, Section};
use nexus_core::store::{SectionStore, SectionTx, StoreResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Which occupancy book a [`PostgresSectionStore`] works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTable {
    /// `sections` and `crew_members`
    Crew,
    /// `life_support_sections` and `life_support_occupants`
    LifeSupport,
}

impl SectionTable {
    const fn sections(self) -> &'static str {
        match self {
            Self::Crew => "sections",
            Self::LifeSupport => "life_support_sections",
        }
    }

    const fn members(self) -> &'static str {
        match self {
            Self::Crew => "crew_members",
            Self::LifeSupport => "life_support_occupants",
        }
    }
}

const SECTION_COLUMNS: &str = "id, name, deck, max_capacity, current_occupancy";
const MEMBER_COLUMNS: &str = "id, name, rank, role, section_id, status";

fn section_from_row(row: &PgRow) -> StoreResult<Section> {
    Ok(Section {
        id: SectionId::new(row.try_get("id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        deck: row.try_get("deck").map_err(db_err)?,
        max_capacity: row.try_get("max_capacity").map_err(db_err)?,
        current_occupancy: row.try_get("current_occupancy").map_err(db_err)?,
    })
}

fn member_from_row(row: &PgRow) -> StoreResult<CrewMember> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(CrewMember {
        id: CrewMemberId::new(row.try_get("id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        rank: row.try_get("rank").map_err(db_err)?,
        role: row.try_get("role").map_err(db_err)?,
        section_id: row
            .try_get::<Option<i64>, _>("section_id")
            .map_err(db_err)?
            .map(SectionId::new),
        status: CrewStatus::parse(&status)?,
    })
}

/// `PostgreSQL` implementation of [`SectionStore`].
#[derive(Clone)]
pub struct PostgresSectionStore {
    pool: PgPool,
    table: SectionTable,
}

impl PostgresSectionStore {
    /// Create a store over `pool` working on `table`.
    #[must_use]
    pub const fn new(pool: PgPool, table: SectionTable) -> Self {
        Self { pool, table }
    }
}

impl SectionStore for PostgresSectionStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn SectionTx>>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(db_err)?;
            Ok(Box::new(PgSectionTx {
                tx,
                table: self.table,
            }) as Box<dyn SectionTx>)
        })
    }

    fn section(&self, id: SectionId) -> BoxFuture<'_, StoreResult<Option<Section>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {SECTION_COLUMNS} FROM {} WHERE id = $1",
                self.table.sections()
            ))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(section_from_row)
            .transpose()
        })
    }

    fn sections(&self) -> BoxFuture<'_, StoreResult<Vec<Section>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {SECTION_COLUMNS} FROM {} ORDER BY id",
                self.table.sections()
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(section_from_row).collect()
        })
    }

    fn crew_members(&self) -> BoxFuture<'_, StoreResult<Vec<CrewMember>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {MEMBER_COLUMNS} FROM {} ORDER BY id",
                self.table.members()
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(member_from_row).collect()
        })
    }
}

struct PgSectionTx {
    tx: Transaction<'static, Postgres>,
    table: SectionTable,
}

impl SectionTx for PgSectionTx {
    fn crew_member_for_update(
        &mut self,
        id: CrewMemberId,
    ) -> BoxFuture<'_, StoreResult<Option<CrewMember>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {MEMBER_COLUMNS} FROM {} WHERE id = $1 FOR UPDATE",
                self.table.members()
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(member_from_row)
            .transpose()
        })
    }

    fn section_for_update(&mut self, id: SectionId) -> BoxFuture<'_, StoreResult<Option<Section>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {SECTION_COLUMNS} FROM {} WHERE id = $1 FOR UPDATE",
                self.table.sections()
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(section_from_row)
            .transpose()
        })
    }

    fn section_with_room_for_update(
        &mut self,
        needed: i32,
    ) -> BoxFuture<'_, StoreResult<Option<Section>>> {
        Box::pin(async move {
            sqlx::query(&format!(
                r"
                SELECT {SECTION_COLUMNS} FROM {}
                WHERE current_occupancy + $1 <= max_capacity
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
                ",
                self.table.sections()
            ))
            .bind(needed)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(section_from_row)
            .transpose()
        })
    }

    fn update_section(&mut self, section: Section) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "UPDATE {} SET current_occupancy = $2, max_capacity = $3 WHERE id = $1",
                self.table.sections()
            ))
            .bind(section.id.get())
            .bind(section.current_occupancy)
            .bind(section.max_capacity)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn update_crew_member(&mut self, member: CrewMember) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "UPDATE {} SET section_id = $2, status = $3 WHERE id = $1",
                self.table.members()
            ))
            .bind(member.id.get())
            .bind(member.section_id.map(SectionId::get))
            .bind(member.status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn insert_crew_member(&mut self, member: NewCrewMember) -> BoxFuture<'_, StoreResult<CrewMember>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                r"
                INSERT INTO {} (name, rank, role, section_id, status)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {MEMBER_COLUMNS}
                ",
                self.table.members()
            ))
            .bind(&member.name)
            .bind(&member.rank)
            .bind(&member.role)
            .bind(member.section_id.map(SectionId::get))
            .bind(member.status.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
            member_from_row(&row)
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move { self.tx.commit().await.map_err(db_err) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move { self.tx.rollback().await.map_err(db_err) })
    }
}
