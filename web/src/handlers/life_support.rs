//! Life-support capacity endpoint.
//!
//! - `POST /api/life-support/adjust-capacity`

use crate::error::{AppError, completed};
use crate::state::AppState;
use axum::{Json, extract::State};
use nexus_core::SectionId;
use nexus_core::model::Section;
use serde::Deserialize;

/// Request to change a section's occupancy.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCapacityRequest {
    /// Section
    pub section_id: SectionId,
    /// Signed occupancy change
    pub occupancy_change: i32,
}

/// Apply an occupancy change, provisioning power for increases.
///
/// # Errors
///
/// 409 when the section would exceed capacity; 400 for a change below the
/// allowed minimum; 404 for an unknown section; 503 when power could not be
/// provisioned (the change is reverted).
pub async fn adjust_capacity(
    State(state): State<AppState>,
    Json(request): Json<AdjustCapacityRequest>,
) -> Result<Json<Section>, AppError> {
    let section = completed(
        state
            .life_support
            .adjust_capacity(request.section_id, request.occupancy_change)
            .await?,
    )?;
    Ok(Json(section))
}
