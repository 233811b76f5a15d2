//! Docking endpoints.
//!
//! - `POST /api/docking/dock/:ship_id`
//! - `POST /api/docking/undock/:ship_id`
//! - `POST /api/docking/schedule-delivery`
//! - `GET /api/docking/bays`, `/ships`, `/ships/incoming`, `/logs`, `/summary`

use crate::error::{AppError, completed};
use crate::extractors::TraceId;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use nexus_core::ShipId;
use nexus_core::model::{Bay, DockingLog, Ship};
use nexus_core::summary::DockingSummary;
use nexus_runtime::{DeliveryRequest, DockingReceipt, UndockReceipt};
use serde::Deserialize;

/// Request to schedule a cargo delivery.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDeliveryRequest {
    /// Ship name
    pub ship_name: String,
    /// Cargo carried
    pub cargo_type: String,
    /// Expected arrival
    pub estimated_arrival: DateTime<Utc>,
}

/// Query parameters for the audit log.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Number of records (default: 50)
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

const fn default_log_limit() -> usize {
    50
}

/// Dock a ship.
///
/// # Errors
///
/// 409 when the ship is already docked, no bay is free or power was
/// declined; 404 for an unknown ship.
pub async fn dock(
    trace: TraceId,
    State(state): State<AppState>,
    Path(ship_id): Path<ShipId>,
) -> Result<Json<DockingReceipt>, AppError> {
    tracing::info!(trace_id = %trace, ship_id = %ship_id, "Dock requested");
    let receipt = completed(state.docking.dock(ship_id).await?)?;
    Ok(Json(receipt))
}

/// Undock a ship.
///
/// # Errors
///
/// 409 when the ship is not docked; 404 for an unknown ship; 500 when no
/// bay holds a docked ship.
pub async fn undock(
    trace: TraceId,
    State(state): State<AppState>,
    Path(ship_id): Path<ShipId>,
) -> Result<Json<UndockReceipt>, AppError> {
    tracing::info!(trace_id = %trace, ship_id = %ship_id, "Undock requested");
    let receipt = completed(state.docking.undock(ship_id).await?)?;
    Ok(Json(receipt))
}

/// Schedule a delivery; responds 201 with the new ship.
///
/// # Errors
///
/// 400 for a blank ship name.
pub async fn schedule_delivery(
    State(state): State<AppState>,
    Json(request): Json<ScheduleDeliveryRequest>,
) -> Result<(StatusCode, Json<Ship>), AppError> {
    if request.cargo_type.trim().is_empty() {
        return Err(AppError::from(nexus_core::Rejection::InvalidInput(
            "cargo type must not be empty".to_string(),
        )));
    }

    let ship = completed(
        state
            .docking
            .schedule_delivery(DeliveryRequest {
                ship_name: request.ship_name,
                cargo_type: request.cargo_type,
                eta: request.estimated_arrival,
            })
            .await?,
    )?;
    Ok((StatusCode::CREATED, Json(ship)))
}

/// All bays.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn bays(State(state): State<AppState>) -> Result<Json<Vec<Bay>>, AppError> {
    Ok(Json(state.docking.bays().await?))
}

/// All ships.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn ships(State(state): State<AppState>) -> Result<Json<Vec<Ship>>, AppError> {
    Ok(Json(state.docking.ships().await?))
}

/// Incoming ships.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn incoming_ships(State(state): State<AppState>) -> Result<Json<Vec<Ship>>, AppError> {
    Ok(Json(state.docking.incoming_ships().await?))
}

/// Most recent audit records.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<DockingLog>>, AppError> {
    Ok(Json(state.docking.logs(query.limit).await?))
}

/// Bay and ship counts.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn summary(State(state): State<AppState>) -> Result<Json<DockingSummary>, AppError> {
    Ok(Json(state.docking.summary().await?))
}
