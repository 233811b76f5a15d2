//! Crew endpoints.
//!
//! - `POST /api/crew/relocate`
//! - `POST /api/crew/arrival` (201)
//! - `GET /api/crew/sections`, `/api/crew/summary`

use crate::error::{AppError, completed};
use crate::extractors::TraceId;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use nexus_core::model::{CrewMember, Section};
use nexus_core::summary::CrewSummary;
use nexus_core::{CrewMemberId, SectionId, ShipId};
use nexus_runtime::Relocation;
use serde::Deserialize;

/// Request to move a crew member.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelocateRequest {
    /// Crew member
    pub crew_id: CrewMemberId,
    /// Destination
    pub target_section_id: SectionId,
}

/// Request to register arriving crew.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalRequest {
    /// Ship they arrived on
    pub ship_id: ShipId,
    /// Number of crew
    pub crew_count: i32,
}

/// Move a crew member to another section.
///
/// # Errors
///
/// 409 when the target is full or already holds the member; 404 for an
/// unknown member or section; 503 when life support could not provision
/// the increase (the move is reverted).
pub async fn relocate(
    trace: TraceId,
    State(state): State<AppState>,
    Json(request): Json<RelocateRequest>,
) -> Result<Json<Relocation>, AppError> {
    tracing::info!(
        trace_id = %trace,
        crew_member_id = %request.crew_id,
        section_id = %request.target_section_id,
        "Relocation requested"
    );
    let relocation = completed(
        state
            .crew
            .relocate(request.crew_id, request.target_section_id)
            .await?,
    )?;
    Ok(Json(relocation))
}

/// Register arriving crew in the first section with room for all of them.
///
/// # Errors
///
/// 409 when no section has room; 400 for a non-positive count.
pub async fn arrival(
    State(state): State<AppState>,
    Json(request): Json<ArrivalRequest>,
) -> Result<(StatusCode, Json<Vec<CrewMember>>), AppError> {
    let members = completed(
        state
            .crew
            .register_arrival(request.ship_id, request.crew_count)
            .await?,
    )?;
    Ok((StatusCode::CREATED, Json(members)))
}

/// All sections.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn sections(State(state): State<AppState>) -> Result<Json<Vec<Section>>, AppError> {
    Ok(Json(state.crew.sections().await?))
}

/// Crew counts by status.
///
/// # Errors
///
/// 500 on a store fault.
pub async fn summary(State(state): State<AppState>) -> Result<Json<CrewSummary>, AppError> {
    Ok(Json(state.crew.crew_summary().await?))
}
