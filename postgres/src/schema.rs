//! Schema bootstrap and facility seed data.
//!
//! Statements are idempotent, so every replica may call [`apply_schema`];
//! the binary still wraps bootstrap in a cluster-wide init lock so seed data
//! is written once.

use crate::db_err;
use nexus_core::StoreError;
use nexus_core::ids::PoolId;
use sqlx::PgPool;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS ships (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        ship_type TEXT NOT NULL,
        status TEXT NOT NULL,
        crew_count INT NOT NULL CHECK (crew_count >= 0),
        cargo_capacity INT NOT NULL,
        arrival_time TIMESTAMPTZ,
        departure_time TIMESTAMPTZ
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS docking_bays (
        id BIGSERIAL PRIMARY KEY,
        bay_number INT NOT NULL UNIQUE,
        status TEXT NOT NULL,
        current_ship_id BIGINT UNIQUE REFERENCES ships(id),
        capacity INT NOT NULL,
        CHECK ((status = 'OCCUPIED') = (current_ship_id IS NOT NULL))
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS docking_logs (
        id BIGSERIAL PRIMARY KEY,
        ship_id BIGINT NOT NULL,
        bay_id BIGINT,
        action TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        details TEXT NOT NULL DEFAULT ''
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_docking_logs_timestamp ON docking_logs(timestamp DESC)",
    r"
    CREATE TABLE IF NOT EXISTS resource_pools (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS power_sources (
        id BIGSERIAL PRIMARY KEY,
        pool_id TEXT NOT NULL REFERENCES resource_pools(id),
        name TEXT NOT NULL,
        source_type TEXT NOT NULL,
        status TEXT NOT NULL,
        max_output_kw DOUBLE PRECISION NOT NULL,
        current_output_kw DOUBLE PRECISION NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS power_allocations (
        pool_id TEXT NOT NULL REFERENCES resource_pools(id),
        system_name TEXT NOT NULL,
        amount_kw DOUBLE PRECISION NOT NULL CHECK (amount_kw > 0),
        priority INT NOT NULL,
        section_id BIGINT,
        allocated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (pool_id, system_name)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS power_logs (
        id BIGSERIAL PRIMARY KEY,
        pool_id TEXT NOT NULL,
        system_name TEXT NOT NULL,
        action TEXT NOT NULL,
        amount_kw DOUBLE PRECISION NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS sections (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        deck INT NOT NULL,
        max_capacity INT NOT NULL,
        current_occupancy INT NOT NULL,
        CHECK (current_occupancy >= 0 AND current_occupancy <= max_capacity)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS crew_members (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        rank TEXT NOT NULL,
        role TEXT NOT NULL,
        section_id BIGINT REFERENCES sections(id),
        status TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS life_support_sections (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        deck INT NOT NULL,
        max_capacity INT NOT NULL,
        current_occupancy INT NOT NULL,
        CHECK (current_occupancy >= 0 AND current_occupancy <= max_capacity)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS life_support_occupants (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        rank TEXT NOT NULL,
        role TEXT NOT NULL,
        section_id BIGINT REFERENCES life_support_sections(id),
        status TEXT NOT NULL
    )
    ",
];

/// Create every table the stores use, if missing.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    for &statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(db_err)?;
    }
    tracing::info!(statements = SCHEMA.len(), "Schema applied");
    Ok(())
}

const SOURCES: &[(&str, &str, &str, f64, f64)] = &[
    ("Solar Array Alpha", "SOLAR_ARRAY", "ONLINE", 5000.0, 4500.0),
    ("Solar Array Beta", "SOLAR_ARRAY", "ONLINE", 5000.0, 4800.0),
    ("Fusion Reactor Core", "FUSION_REACTOR", "ONLINE", 50000.0, 45000.0),
    ("Emergency Battery Bank", "BATTERY_BANK", "STANDBY", 10000.0, 0.0),
    ("Fuel Cell Array", "FUEL_CELL", "ONLINE", 8000.0, 7000.0),
];

const BAY_CAPACITIES: &[i32] = &[
    6000, 4000, 5000, 3500, 5000, 8000, 4500, 6000, 3000, 5500, 7000, 4000,
];

const SECTIONS: &[(&str, i32, i32)] = &[
    ("Command Center", 1, 20),
    ("Engineering Bay", 2, 30),
    ("Crew Quarters Alpha", 4, 40),
    ("Crew Quarters Beta", 4, 40),
    ("Medical Bay", 3, 15),
    ("Science Labs", 3, 25),
    ("Cargo Bay", 5, 10),
    ("Docking Section", 5, 15),
];

const SHIPS: &[(&str, &str, i32, i32, i64)] = &[
    ("RSS Provision", "SUPPLY", 8, 3000, 30),
    ("SRV Discovery", "RESEARCH", 25, 1000, 45),
    ("UNS Defender", "MILITARY", 150, 800, 60),
    ("MSV Iron Clad", "CARGO", 14, 6000, 75),
    ("CSV Starliner", "PASSENGER", 120, 600, 90),
    ("RSS Bounty", "SUPPLY", 6, 2500, 105),
];

/// Write the initial facility layout into empty tables.
///
/// Each table group is only seeded when it has no rows, so calling this on
/// an initialized database changes nothing.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a statement fails.
pub async fn seed_facility(pool: &PgPool, power_pool: &PoolId) -> Result<(), StoreError> {
    let mut tx = pool.begin().await.map_err(db_err)?;

    sqlx::query("INSERT INTO resource_pools (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(power_pool.as_str())
        .bind("Main Grid")
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

    if is_empty(&mut tx, "power_sources").await? {
        for &(name, source_type, status, max_kw, current_kw) in SOURCES {
            sqlx::query(
                r"
                INSERT INTO power_sources
                    (pool_id, name, source_type, status, max_output_kw, current_output_kw)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(power_pool.as_str())
            .bind(name)
            .bind(source_type)
            .bind(status)
            .bind(max_kw)
            .bind(current_kw)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
    }

    if is_empty(&mut tx, "docking_bays").await? {
        for (number, capacity) in (1_i32..).zip(BAY_CAPACITIES.iter().copied()) {
            sqlx::query(
                "INSERT INTO docking_bays (bay_number, status, capacity) VALUES ($1, 'AVAILABLE', $2)",
            )
            .bind(number)
            .bind(capacity)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
    }

    if is_empty(&mut tx, "ships").await? {
        let now = chrono::Utc::now();
        for &(name, ship_type, crew, cargo, eta_minutes) in SHIPS {
            sqlx::query(
                r"
                INSERT INTO ships (name, ship_type, status, crew_count, cargo_capacity, arrival_time)
                VALUES ($1, $2, 'INCOMING', $3, $4, $5)
                ",
            )
            .bind(name)
            .bind(ship_type)
            .bind(crew)
            .bind(cargo)
            .bind(now + chrono::Duration::minutes(eta_minutes))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
    }

    for table in ["sections", "life_support_sections"] {
        if is_empty(&mut tx, table).await? {
            for &(name, deck, max) in SECTIONS {
                sqlx::query(&format!(
                    "INSERT INTO {table} (name, deck, max_capacity, current_occupancy) VALUES ($1, $2, $3, 0)"
                ))
                .bind(name)
                .bind(deck)
                .bind(max)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }
    }

    tx.commit().await.map_err(db_err)?;
    tracing::info!(pool_id = %power_pool, "Facility seed checked");
    Ok(())
}

async fn is_empty(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    table: &str,
) -> Result<bool, StoreError> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(count == 0)
}
