//! Fleet Dashboard Core
//!
//! Assignment-consistency layer for the fleet management dashboard: a
//! tag-invalidated cache over the remote fleet API, a durable overlay of
//! optimistic driver assignments, and the coordinator that keeps a driver on
//! at most one bus.

pub mod api;
pub mod assignment;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod models;
pub mod overlay;
pub mod remote;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dashboard::Dashboard;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Buses
        .route("/buses", get(api::list_buses).post(api::create_bus))
        .route(
            "/buses/{id}",
            get(api::get_bus)
                .put(api::update_bus)
                .delete(api::delete_bus),
        )
        .route("/buses/{id}/drivers", get(api::bus_drivers))
        .route("/buses/{id}/stops", get(api::list_stops).post(api::add_stop))
        .route(
            "/buses/{id}/stops/{stop_id}",
            put(api::update_stop).delete(api::delete_stop),
        )
        .route("/stats", get(api::route_stats))
        .route("/today-trips", get(api::today_trips))
        // Drivers
        .route("/drivers", get(api::list_drivers).post(api::add_driver))
        .route(
            "/drivers/{id}",
            get(api::get_driver)
                .put(api::update_driver)
                .delete(api::remove_driver),
        )
        .route("/drivers/{id}/assign", put(api::assign_driver))
        // Assignments
        .route("/assignments", get(api::get_assignments));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod testing;
