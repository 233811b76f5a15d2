//! Axum HTTP surface for the Nexus coordination core.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         HTTP shell (this crate)         │  ← routing, JSON, trace ids
//! │  - Request parsing                      │  ← AppError mapping
//! │  - Response serialization               │  ← outbound reqwest clients
//! ├─────────────────────────────────────────┤
//! │         nexus-runtime                   │
//! │  - Docking saga, ledger, guards         │  ← Outcome / FacilityError
//! │  - Aggregation gateway                  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives; the trace id middleware tags it
//! 2. **Extract** path, query and JSON body
//! 3. **Call** the runtime service held in [`AppState`]
//! 4. **Map** `Outcome::Rejected` to 409/400 and faults to 404/503/500
//! 5. **Return** JSON with the `X-Trace-Id` header

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod clients;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use handlers::{crew, dashboard, docking, life_support, power};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::AppError;
pub use extractors::TraceId;
pub use middleware::{TRACE_ID_HEADER, trace_id_layer};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Docking
        .route("/docking/dock/:ship_id", post(docking::dock))
        .route("/docking/undock/:ship_id", post(docking::undock))
        .route("/docking/schedule-delivery", post(docking::schedule_delivery))
        .route("/docking/bays", get(docking::bays))
        .route("/docking/ships", get(docking::ships))
        .route("/docking/ships/incoming", get(docking::incoming_ships))
        .route("/docking/logs", get(docking::logs))
        .route("/docking/summary", get(docking::summary))
        // Power
        .route("/power/allocate", post(power::allocate))
        .route("/power/deallocate", post(power::deallocate))
        .route("/power/grid", get(power::grid))
        .route("/power/allocations", get(power::allocations))
        // Crew
        .route("/crew/relocate", post(crew::relocate))
        .route("/crew/arrival", post(crew::arrival))
        .route("/crew/sections", get(crew::sections))
        .route("/crew/summary", get(crew::summary))
        // Life support
        .route(
            "/life-support/adjust-capacity",
            post(life_support::adjust_capacity),
        )
        // Dashboard
        .route("/dashboard/status", get(dashboard::status))
        .route("/dashboard/health", get(dashboard::health));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(trace_id_layer())
}
