//! Nexus Server
//!
//! Main process for the station coordination core.
//!
//! This binary:
//! - Connects to `PostgreSQL` and Redis
//! - Applies the schema and seeds the facility once per cluster
//! - Wires docking, power, crew and life-support services
//! - Listens for docking return timers
//! - Serves the HTTP API and a Prometheus scrape endpoint
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin nexus
//! ```

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use nexus_core::environment::SystemClock;
use nexus_core::kv::{KeyExpirySource, KeyValueStore};
use nexus_postgres::{
    PostgresDockingStore, PostgresPowerStore, PostgresSectionStore, SectionTable, apply_schema,
    seed_facility,
};
use nexus_redis::RedisKeyValueStore;
use nexus_runtime::DistributedMutex;
use nexus_web::bootstrap::{self, Backends, Services};
use nexus_web::clients::http_client;
use nexus_web::config::EnvFile;
use nexus_web::{Config, build_router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long one replica may hold the bootstrap lock.
const INIT_LOCK_TTL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let env_file = EnvFile::from_result(dotenvy::dotenv());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nexus_web=info,nexus_runtime=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    env_file.log();

    tracing::info!("Starting Nexus coordination core...");

    let config = Config::from_env();
    tracing::info!(
        postgres = %config.postgres.url,
        redis = %config.redis.url,
        bind = %config.bind_address(),
        "Configuration loaded"
    );

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.server.metrics_port))
        .install()
        .context("failed to install Prometheus exporter")?;

    let pool = nexus_postgres::connect(&config.postgres.url, config.postgres.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    let redis = Arc::new(
        RedisKeyValueStore::new(&config.redis.url)
            .await
            .context("failed to connect to Redis")?,
    );
    tracing::info!("✓ Connected to PostgreSQL and Redis");

    let mutex = DistributedMutex::new(Arc::clone(&redis) as Arc<dyn KeyValueStore>);
    let power_pool = config.ledger.default_pool.clone();
    let bootstrap_pool = pool.clone();
    let initialized = mutex
        .run_once("nexus", INIT_LOCK_TTL, || async move {
            apply_schema(&bootstrap_pool).await?;
            seed_facility(&bootstrap_pool, &power_pool).await
        })
        .await
        .context("failed to take the initialization lock")?;
    match initialized {
        Some(result) => {
            result.context("failed to initialize the database")?;
            tracing::info!("✓ Schema applied and facility seeded");
        }
        None => tracing::info!("Another instance is initializing the database"),
    }

    let http = http_client(config.collaborators.http_timeout)
        .context("failed to build HTTP client")?;
    let Services { state, trigger } = bootstrap::assemble(
        Backends {
            docking: Arc::new(PostgresDockingStore::new(pool.clone())),
            power: Arc::new(PostgresPowerStore::new(pool.clone())),
            crew_sections: Arc::new(PostgresSectionStore::new(pool.clone(), SectionTable::Crew)),
            life_support_sections: Arc::new(PostgresSectionStore::new(
                pool,
                SectionTable::LifeSupport,
            )),
            kv: Arc::clone(&redis) as Arc<dyn KeyValueStore>,
            clock: Arc::new(SystemClock),
        },
        &config,
        &http,
    );

    let expiries = Arc::clone(&redis) as Arc<dyn KeyExpirySource>;
    let (shutdown, shutdown_rx) = watch::channel(false);
    let timers = tokio::spawn(trigger.listen(expiries, shutdown_rx));
    tracing::info!("✓ Return timer listener started");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    tracing::info!(address = %config.bind_address(), "Nexus is running");
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for Ctrl+C, shutting down");
            }
            tracing::info!("Shutting down gracefully...");
            if shutdown.send(true).is_err() {
                tracing::debug!("Return timer listener already stopped");
            }
        })
        .await
        .context("server error")?;

    if let Err(e) = timers.await {
        tracing::error!(error = %e, "Return timer listener panicked");
    }

    Ok(())
}
