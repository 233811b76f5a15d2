//! Dashboard endpoints.
//!
//! - `GET /api/dashboard/status`
//! - `GET /api/dashboard/health`
//!
//! Both always answer 200: a failing provider shows up as a defaulted
//! summary or a `DOWN` entry, never as an error response.

use crate::state::AppState;
use axum::{Json, extract::State};
use nexus_core::summary::{DashboardStatus, HealthReport};

/// Aggregated facility status.
pub async fn status(State(state): State<AppState>) -> Json<DashboardStatus> {
    Json(state.gateway.status().await)
}

/// Reachability of every provider.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.gateway.health().await)
}
