//! Power endpoints over the ledger's default pool.
//!
//! - `POST /api/power/allocate` (201)
//! - `POST /api/power/deallocate`
//! - `GET /api/power/grid`, `/api/power/allocations`

use crate::error::{AppError, completed};
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use nexus_core::SectionId;
use nexus_core::model::Allocation;
use nexus_runtime::{AllocationRequest, PoolStatus};
use serde::{Deserialize, Serialize};

/// Request to allocate power.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    /// Consumer system
    pub system: String,
    /// Amount in kW
    pub amount_kw: f64,
    /// Section served
    pub section_id: Option<SectionId>,
    /// Priority (default: 5)
    pub priority: Option<i32>,
}

/// Allocation after the request was applied.
///
/// Readable as a `PowerGrant` by remote power clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    /// Consumer system
    pub system: String,
    /// Total now held by the system in kW
    pub allocated_kw: f64,
    /// Priority recorded
    pub priority: i32,
    /// Section served
    pub section_id: Option<SectionId>,
    /// Human-readable confirmation
    pub message: String,
}

impl From<Allocation> for AllocationResponse {
    fn from(allocation: Allocation) -> Self {
        Self {
            message: format!(
                "{} now holds {} kW",
                allocation.system, allocation.amount_kw
            ),
            system: allocation.system,
            allocated_kw: allocation.amount_kw,
            priority: allocation.priority,
            section_id: allocation.section_id,
        }
    }
}

/// Request to release a system's power.
#[derive(Debug, Deserialize)]
pub struct DeallocateRequest {
    /// Consumer system
    pub system: String,
}

/// Result of a deallocation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeallocateResponse {
    /// Consumer system
    pub system: String,
    /// kW released, 0 when nothing was held
    pub released_kw: f64,
}

/// Allocate power.
///
/// # Errors
///
/// 409 when the pool cannot cover the amount; 400 for a blank system or a
/// non-positive amount.
pub async fn allocate(
    State(state): State<AppState>,
    Json(request): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocationResponse>), AppError> {
    if request.system.trim().is_empty() {
        return Err(AppError::from(nexus_core::Rejection::InvalidInput(
            "system name must not be empty".to_string(),
        )));
    }

    let mut allocation = AllocationRequest::new(request.system, request.amount_kw);
    if let Some(priority) = request.priority {
        allocation = allocation.priority(priority);
    }
    if let Some(section) = request.section_id {
        allocation = allocation.section(section);
    }

    let pool = state.ledger.default_pool();
    let granted = completed(state.ledger.allocate(pool, allocation).await?)?;
    Ok((StatusCode::CREATED, Json(granted.into())))
}

/// Release everything a system holds. Idempotent.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn deallocate(
    State(state): State<AppState>,
    Json(request): Json<DeallocateRequest>,
) -> Result<Json<DeallocateResponse>, AppError> {
    let pool = state.ledger.default_pool();
    let removed = state.ledger.deallocate(pool, &request.system).await?;
    Ok(Json(DeallocateResponse {
        system: request.system,
        released_kw: removed.map_or(0.0, |a| a.amount_kw),
    }))
}

/// Grid status of the default pool.
///
/// # Errors
///
/// 404 when the pool is not provisioned.
pub async fn grid(State(state): State<AppState>) -> Result<Json<PoolStatus>, AppError> {
    Ok(Json(state.ledger.status(state.ledger.default_pool()).await?))
}

/// Allocations of the default pool.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn allocations(State(state): State<AppState>) -> Result<Json<Vec<Allocation>>, AppError> {
    Ok(Json(
        state.ledger.allocations(state.ledger.default_pool()).await?,
    ))
}
