//! Bus API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use super::{cached, success, ApiResult};
use crate::dashboard::BusSelection;
use crate::models::{
    Bus, BusPage, CreateBusRequest, ListBusesParams, NewRouteStop, RouteStop, UpdateBusRequest,
    UpdateRouteStopRequest,
};
use crate::AppState;

/// GET /api/buses - List buses, filtered and paginated remotely.
pub async fn list_buses(
    State(state): State<AppState>,
    Query(params): Query<ListBusesParams>,
) -> ApiResult<BusPage> {
    cached(state.dashboard.list_buses(params).await?)
}

/// GET /api/buses/:id - Get a single bus.
pub async fn get_bus(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Bus> {
    cached(state.dashboard.get_bus(&id).await?)
}

/// POST /api/buses - Create a bus.
pub async fn create_bus(
    State(state): State<AppState>,
    Json(request): Json<CreateBusRequest>,
) -> ApiResult<Value> {
    success(state.dashboard.create_bus(request).await?)
}

/// PUT /api/buses/:id - Update a bus.
pub async fn update_bus(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateBusRequest>,
) -> ApiResult<Value> {
    success(state.dashboard.update_bus(&id, request).await?)
}

/// DELETE /api/buses/:id - Delete a bus.
pub async fn delete_bus(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    success(state.dashboard.delete_bus(&id).await?)
}

/// GET /api/buses/:id/drivers - Drivers eligible for this bus.
pub async fn bus_drivers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BusSelection> {
    cached(state.dashboard.bus_selection(&id).await?)
}

/// GET /api/buses/:id/stops - Stops along a bus route.
pub async fn list_stops(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<RouteStop>> {
    cached(state.dashboard.route_stops(&id).await?)
}

/// POST /api/buses/:id/stops - Add a stop.
pub async fn add_stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<NewRouteStop>,
) -> ApiResult<Value> {
    success(state.dashboard.add_route_stop(&id, request).await?)
}

/// PUT /api/buses/:id/stops/:stop_id - Update a stop.
pub async fn update_stop(
    State(state): State<AppState>,
    Path((id, stop_id)): Path<(String, String)>,
    Json(request): Json<UpdateRouteStopRequest>,
) -> ApiResult<Value> {
    success(
        state
            .dashboard
            .update_route_stop(&id, &stop_id, request)
            .await?,
    )
}

/// DELETE /api/buses/:id/stops/:stop_id - Remove a stop.
pub async fn delete_stop(
    State(state): State<AppState>,
    Path((id, stop_id)): Path<(String, String)>,
) -> ApiResult<Value> {
    success(state.dashboard.delete_route_stop(&id, &stop_id).await?)
}

/// GET /api/stats - Route statistics.
pub async fn route_stats(State(state): State<AppState>) -> ApiResult<Value> {
    cached(state.dashboard.route_stats().await?)
}

/// GET /api/today-trips - Trips departing today.
pub async fn today_trips(State(state): State<AppState>) -> ApiResult<Value> {
    cached(state.dashboard.today_trips().await?)
}
