//! Driver API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use super::{cached, success, ApiResult};
use crate::models::{AddDriverRequest, DriverListing, UpdateDriverRequest};
use crate::AppState;

/// GET /api/drivers - List drivers, Active first.
pub async fn list_drivers(State(state): State<AppState>) -> ApiResult<Vec<DriverListing>> {
    cached(state.dashboard.list_drivers().await?)
}

/// GET /api/drivers/:id - Get a single driver.
pub async fn get_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DriverListing> {
    cached(state.dashboard.get_driver(&id).await?)
}

/// POST /api/drivers - Invite a driver.
pub async fn add_driver(
    State(state): State<AppState>,
    Json(request): Json<AddDriverRequest>,
) -> ApiResult<Value> {
    success(state.dashboard.add_driver(request).await?)
}

/// PUT /api/drivers/:id - Update a driver.
pub async fn update_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDriverRequest>,
) -> ApiResult<Value> {
    success(state.dashboard.update_driver(&id, request).await?)
}

/// DELETE /api/drivers/:id - Remove a driver.
pub async fn remove_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    success(state.dashboard.remove_driver(&id).await?)
}
