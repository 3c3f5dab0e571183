//! Assignment API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use super::{success, ApiResult};
use crate::dashboard::AssignmentsView;
use crate::models::AssignDriverRequest;
use crate::AppState;

/// Body returned after a successful assignment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReceipt {
    pub driver_id: String,
    pub bus_id: String,
}

/// PUT /api/drivers/:id/assign - Assign a driver to a bus.
pub async fn assign_driver(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Json(request): Json<AssignDriverRequest>,
) -> ApiResult<AssignmentReceipt> {
    state
        .dashboard
        .assign_driver(&driver_id, &request.bus_id)
        .await?;

    success(AssignmentReceipt {
        driver_id,
        bus_id: request.bus_id,
    })
}

/// GET /api/assignments - Overlay selections and conflicts.
pub async fn get_assignments(State(state): State<AppState>) -> ApiResult<AssignmentsView> {
    success(state.dashboard.assignments().await)
}
