//! Application state for Axum handlers.

use nexus_runtime::{AggregationGateway, CapacityGuard, CapacityLedger, DockingOrchestrator};
use std::sync::Arc;

/// Services shared by every handler.
///
/// Each field is an `Arc` so cloning the state per request is cheap.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Vec<Bay>>, AppError> {
///     Ok(Json(state.docking.bays().await?))
/// }
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Docking saga
    pub docking: Arc<DockingOrchestrator>,
    /// Power ledger
    pub ledger: Arc<CapacityLedger>,
    /// Crew occupancy guard
    pub crew: Arc<CapacityGuard>,
    /// Life-support occupancy guard
    pub life_support: Arc<CapacityGuard>,
    /// Dashboard aggregation
    pub gateway: Arc<AggregationGateway>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
