//! The dashboard core: one value owning the remote client, the server cache,
//! the overlay store and the assignment coordinator.
//!
//! Every screen operation goes through here. Reads are served from the cache,
//! writes go through [`ServerCache::mutate`] so tag invalidation always
//! follows a successful remote write.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::assignment::{
    duplicate_targets, eligible_drivers, sort_for_display, AssignmentCoordinator,
};
use crate::cache::{CacheSnapshot, Cached, ServerCache};
use crate::config::Config;
use crate::db::{init_database, SqliteKvStore, UnavailableStore};
use crate::errors::{FleetError, FleetResult};
use crate::models::{
    AddDriverRequest, Bus, BusPage, CreateBusRequest, Driver, DriverListing, ListBusesParams,
    NewRouteStop, RouteStop, UpdateBusRequest, UpdateDriverRequest, UpdateRouteStopRequest,
};
use crate::overlay::{KeyValueStore, OverlayStore, OverlayView};
use crate::remote::{FleetApi, HttpFleetApi, Mutation, Query};

/// Driver choices for one bus.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusSelection {
    pub bus_id: String,
    /// Overlay choice, if the operator made one
    pub selected: Option<String>,
    /// Server-confirmed driver
    pub confirmed: Option<String>,
    pub drivers: Vec<DriverListing>,
}

/// Overlay state plus any driver targeted by more than one bus.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsView {
    #[serde(flatten)]
    pub overlay: OverlayView,
    pub conflicts: BTreeMap<String, Vec<String>>,
}

pub struct Dashboard {
    cache: ServerCache,
    overlay: Arc<OverlayStore>,
    coordinator: AssignmentCoordinator,
}

impl Dashboard {
    /// Build a dashboard over the given transport and store. The overlay is
    /// not hydrated until [`Dashboard::hydrate`] runs.
    pub fn new(
        api: Arc<dyn FleetApi>,
        store: Arc<dyn KeyValueStore>,
        overlay_key: impl Into<String>,
    ) -> Self {
        let cache = ServerCache::new(api);
        let overlay = Arc::new(OverlayStore::new(store, overlay_key));
        let coordinator = AssignmentCoordinator::new(cache.clone(), overlay.clone());
        Self {
            cache,
            overlay,
            coordinator,
        }
    }

    /// Open the SQLite store, connect the HTTP client and hydrate.
    ///
    /// A database that cannot be opened does not stop startup: the overlay
    /// hydrates as degraded and lives in memory only.
    pub async fn init(config: &Config) -> FleetResult<Self> {
        let store: Arc<dyn KeyValueStore> = match init_database(&config.db_path).await {
            Ok(pool) => Arc::new(SqliteKvStore::new(pool)),
            Err(e) => {
                tracing::warn!(
                    "Could not open overlay database {:?}, continuing without persistence: {}",
                    config.db_path,
                    e
                );
                Arc::new(UnavailableStore::new(e.to_string()))
            }
        };
        let api = Arc::new(HttpFleetApi::new(
            config.api_base_url.clone(),
            config.request_timeout,
        )?);
        tracing::info!("Remote fleet API: {}", api.base_url());

        let dashboard = Self::new(api, store, config.overlay_key.clone());
        dashboard.hydrate().await;
        Ok(dashboard)
    }

    pub async fn hydrate(&self) {
        self.overlay.hydrate().await;
    }

    /// Persist the overlay one last time.
    pub async fn shutdown(&self) {
        self.overlay.flush().await;
        tracing::info!("Dashboard shut down");
    }

    pub fn cache(&self) -> &ServerCache {
        &self.cache
    }

    pub fn overlay(&self) -> &OverlayStore {
        &self.overlay
    }

    pub async fn subscribe(&self, query: &Query) -> watch::Receiver<CacheSnapshot> {
        self.cache.subscribe(query).await
    }

    /// Explicit user refresh: bypass freshness.
    pub async fn refresh(&self, query: &Query) -> FleetResult<Cached<Value>> {
        self.cache.refetch(query).await
    }

    // Buses

    pub async fn list_buses(&self, params: ListBusesParams) -> FleetResult<Cached<BusPage>> {
        self.cache.query(&Query::ListBuses(params)).await?.decode()
    }

    pub async fn get_bus(&self, id: &str) -> FleetResult<Cached<Bus>> {
        require_id("Bus", id)?;
        self.cache.query(&Query::GetBus(id.to_string())).await?.decode()
    }

    pub async fn route_stats(&self) -> FleetResult<Cached<Value>> {
        self.cache.query(&Query::RouteStats).await
    }

    pub async fn today_trips(&self) -> FleetResult<Cached<Value>> {
        self.cache.query(&Query::TodayTrips).await
    }

    pub async fn create_bus(&self, request: CreateBusRequest) -> FleetResult<Value> {
        request.validate()?;
        self.cache.mutate(&Mutation::CreateBus(request)).await
    }

    pub async fn update_bus(&self, id: &str, changes: UpdateBusRequest) -> FleetResult<Value> {
        require_id("Bus", id)?;
        if changes.is_empty() {
            return Err(FleetError::Validation("No changes supplied".to_string()));
        }
        changes.validate()?;
        self.cache
            .mutate(&Mutation::UpdateBus {
                id: id.to_string(),
                changes,
            })
            .await
    }

    pub async fn delete_bus(&self, id: &str) -> FleetResult<Value> {
        require_id("Bus", id)?;
        let data = self.cache.mutate(&Mutation::DeleteBus(id.to_string())).await?;
        self.overlay.forget_bus(id).await;
        Ok(data)
    }

    // Route stops

    pub async fn route_stops(&self, route_id: &str) -> FleetResult<Cached<Vec<RouteStop>>> {
        require_id("Bus", route_id)?;
        self.cache
            .query(&Query::RouteStops(route_id.to_string()))
            .await?
            .decode()
    }

    pub async fn add_route_stop(&self, route_id: &str, stop: NewRouteStop) -> FleetResult<Value> {
        require_id("Bus", route_id)?;
        stop.validate()?;
        self.cache
            .mutate(&Mutation::AddRouteStop {
                route_id: route_id.to_string(),
                stop,
            })
            .await
    }

    pub async fn update_route_stop(
        &self,
        route_id: &str,
        stop_id: &str,
        changes: UpdateRouteStopRequest,
    ) -> FleetResult<Value> {
        require_id("Bus", route_id)?;
        require_id("Stop", stop_id)?;
        if changes.is_empty() {
            return Err(FleetError::Validation("No changes supplied".to_string()));
        }
        changes.validate()?;
        self.cache
            .mutate(&Mutation::UpdateRouteStop {
                route_id: route_id.to_string(),
                stop_id: stop_id.to_string(),
                changes,
            })
            .await
    }

    pub async fn delete_route_stop(&self, route_id: &str, stop_id: &str) -> FleetResult<Value> {
        require_id("Bus", route_id)?;
        require_id("Stop", stop_id)?;
        self.cache
            .mutate(&Mutation::DeleteRouteStop {
                route_id: route_id.to_string(),
                stop_id: stop_id.to_string(),
            })
            .await
    }

    // Drivers

    /// All drivers with their derived status, Active first.
    pub async fn list_drivers(&self) -> FleetResult<Cached<Vec<DriverListing>>> {
        let cached: Cached<Vec<Driver>> = self.cache.query(&Query::ListDrivers).await?.decode()?;
        Ok(cached.map(|mut drivers| {
            sort_for_display(&mut drivers);
            drivers.into_iter().map(DriverListing::from).collect()
        }))
    }

    pub async fn get_driver(&self, id: &str) -> FleetResult<Cached<DriverListing>> {
        require_id("Driver", id)?;
        let cached: Cached<Driver> = self
            .cache
            .query(&Query::GetDriver(id.to_string()))
            .await?
            .decode()?;
        Ok(cached.map(DriverListing::from))
    }

    pub async fn add_driver(&self, request: AddDriverRequest) -> FleetResult<Value> {
        request.validate()?;
        self.cache.mutate(&Mutation::AddDriver(request)).await
    }

    pub async fn update_driver(
        &self,
        id: &str,
        changes: UpdateDriverRequest,
    ) -> FleetResult<Value> {
        require_id("Driver", id)?;
        if changes.is_empty() {
            return Err(FleetError::Validation("No changes supplied".to_string()));
        }
        changes.validate()?;
        self.cache
            .mutate(&Mutation::UpdateDriver {
                id: id.to_string(),
                changes,
            })
            .await
    }

    pub async fn remove_driver(&self, id: &str) -> FleetResult<Value> {
        require_id("Driver", id)?;
        let data = self.cache.mutate(&Mutation::RemoveDriver(id.to_string())).await?;
        self.overlay.release_driver(id).await;
        Ok(data)
    }

    // Assignment

    pub async fn assign_driver(&self, driver_id: &str, bus_id: &str) -> FleetResult<()> {
        self.coordinator.assign(driver_id, bus_id).await
    }

    /// Drivers that may be picked for `bus_id`, with the current selection.
    pub async fn bus_selection(&self, bus_id: &str) -> FleetResult<Cached<BusSelection>> {
        require_id("Bus", bus_id)?;
        let cached: Cached<Vec<Driver>> = self.cache.query(&Query::ListDrivers).await?.decode()?;
        let selected = self.overlay.get(bus_id).await.driver_id().map(str::to_string);

        Ok(cached.map(|drivers| {
            let confirmed = drivers
                .iter()
                .find(|d| d.assigned_bus() == Some(bus_id))
                .map(|d| d.id.clone());
            BusSelection {
                bus_id: bus_id.to_string(),
                selected,
                confirmed,
                drivers: eligible_drivers(&drivers, bus_id)
                    .into_iter()
                    .map(DriverListing::from)
                    .collect(),
            }
        }))
    }

    /// Overlay contents; conflicts are computed from whatever driver list is
    /// cached, without a network call.
    pub async fn assignments(&self) -> AssignmentsView {
        let overlay = self.overlay.view().await;
        let drivers: Vec<Driver> = self
            .cache
            .peek(&Query::ListDrivers)
            .await
            .and_then(|snapshot| snapshot.data)
            .and_then(|data| serde_json::from_value(data).ok())
            .unwrap_or_default();
        let conflicts = duplicate_targets(&overlay.entries, &drivers);
        AssignmentsView { overlay, conflicts }
    }
}

fn require_id(what: &str, id: &str) -> FleetResult<()> {
    if id.trim().is_empty() {
        return Err(FleetError::Validation(format!("{} id is required", what)));
    }
    Ok(())
}
