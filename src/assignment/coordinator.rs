//! End-to-end driver assignment with optimistic overlay and rollback.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::Instrument;
use uuid::Uuid;

use super::exclusivity::check_assignable;
use crate::cache::ServerCache;
use crate::errors::{FleetError, FleetResult};
use crate::models::Driver;
use crate::overlay::OverlayStore;
use crate::remote::{Mutation, Query};

/// Runs assignments: exclusivity gate, optimistic write, remote mutation,
/// and revert on failure. At most one assignment per bus is in flight.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    cache: ServerCache,
    overlay: Arc<OverlayStore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases the bus slot when the assignment finishes, however it ends.
struct InFlightGuard {
    buses: Arc<Mutex<HashSet<String>>>,
    bus_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut buses) = self.buses.lock() {
            buses.remove(&self.bus_id);
        }
    }
}

impl AssignmentCoordinator {
    pub fn new(cache: ServerCache, overlay: Arc<OverlayStore>) -> Self {
        Self {
            cache,
            overlay,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn assign(&self, driver_id: &str, bus_id: &str) -> FleetResult<()> {
        let span = tracing::info_span!(
            "assign",
            request_id = %Uuid::new_v4(),
            driver_id = %driver_id,
            bus_id = %bus_id
        );
        self.run(driver_id, bus_id).instrument(span).await
    }

    pub fn is_in_flight(&self, bus_id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|buses| buses.contains(bus_id))
            .unwrap_or(false)
    }

    async fn run(&self, driver_id: &str, bus_id: &str) -> FleetResult<()> {
        if driver_id.trim().is_empty() {
            return Err(FleetError::Validation("Driver id is required".to_string()));
        }
        if bus_id.trim().is_empty() {
            return Err(FleetError::Validation("Bus id is required".to_string()));
        }
        if !self.overlay.is_hydrated().await {
            return Err(FleetError::NotReady(
                "Assignments are not accepted until local state is loaded".to_string(),
            ));
        }

        let _guard = self.claim(bus_id)?;

        if let Some(driver) = self.find_driver(driver_id).await? {
            if let Err(e) = check_assignable(&driver, bus_id) {
                tracing::info!("Rejected: {}", e);
                return Err(e);
            }
        } else {
            tracing::debug!("Driver {} not in the cached list, deferring to server", driver_id);
        }

        let previous = self.overlay.get(bus_id).await;
        self.overlay.set(bus_id, driver_id).await;

        let mutation = Mutation::AssignDriver {
            driver_id: driver_id.to_string(),
            bus_id: bus_id.to_string(),
        };
        match self.cache.mutate(&mutation).await {
            Ok(_) => {
                tracing::info!("Driver {} assigned to bus {}", driver_id, bus_id);
                Ok(())
            }
            Err(e) => {
                let restore = previous.revert_value();
                tracing::warn!(
                    "Assignment failed, reverting bus {} to {:?}: {}",
                    bus_id,
                    restore,
                    e
                );
                self.overlay.set(bus_id, restore).await;
                Err(e)
            }
        }
    }

    fn claim(&self, bus_id: &str) -> FleetResult<InFlightGuard> {
        let mut buses = self
            .in_flight
            .lock()
            .map_err(|_| FleetError::AssignmentInProgress {
                bus_id: bus_id.to_string(),
            })?;
        if !buses.insert(bus_id.to_string()) {
            return Err(FleetError::AssignmentInProgress {
                bus_id: bus_id.to_string(),
            });
        }
        Ok(InFlightGuard {
            buses: self.in_flight.clone(),
            bus_id: bus_id.to_string(),
        })
    }

    /// Look the driver up in the driver list, falling back to stale data
    /// when the list cannot be refreshed.
    async fn find_driver(&self, driver_id: &str) -> FleetResult<Option<Driver>> {
        let drivers = match self.cache.query(&Query::ListDrivers).await {
            Ok(cached) => cached.data,
            Err(e) => match self.cache.peek(&Query::ListDrivers).await.and_then(|s| s.data) {
                Some(stale) => {
                    tracing::warn!("Driver list refresh failed, checking stale data: {}", e);
                    stale
                }
                None => return Err(e),
            },
        };

        let drivers: Vec<Driver> = serde_json::from_value(drivers)?;
        Ok(drivers.into_iter().find(|d| d.id == driver_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Tag, TagKind};
    use crate::overlay::OverlaySelection;
    use crate::testing::{bus, driver, init_tracing, FakeFleetApi, MemoryStore};
    use reqwest::Method;
    use std::time::Duration;

    struct Harness {
        api: Arc<FakeFleetApi>,
        cache: ServerCache,
        overlay: Arc<OverlayStore>,
        coordinator: AssignmentCoordinator,
    }

    async fn harness() -> Harness {
        init_tracing();
        let api = FakeFleetApi::new();
        for id in ["B1", "B2", "B3"] {
            api.insert_bus(bus(id));
        }
        api.insert_driver(driver("D1", None));
        api.insert_driver(driver("D2", None));
        api.insert_driver(driver("D3", None));
        let api = Arc::new(api);

        let cache = ServerCache::new(api.clone());
        let overlay = Arc::new(OverlayStore::new(
            Arc::new(MemoryStore::default()),
            "fleet.selectedDrivers",
        ));
        overlay.hydrate().await;
        let coordinator = AssignmentCoordinator::new(cache.clone(), overlay.clone());

        Harness {
            api,
            cache,
            overlay,
            coordinator,
        }
    }

    fn listed(cache_data: &serde_json::Value, id: &str) -> Driver {
        let drivers: Vec<Driver> = serde_json::from_value(cache_data.clone()).unwrap();
        drivers.into_iter().find(|d| d.id == id).unwrap()
    }

    #[tokio::test]
    async fn test_assign_then_exclusivity_rejects_second_bus() {
        let h = harness().await;
        let mut rx = h.cache.subscribe(&Query::ListDrivers).await;

        h.coordinator.assign("D1", "B1").await.unwrap();
        assert_eq!(h.overlay.get("B1").await, OverlaySelection::Driver("D1".into()));

        // The subscribed list was refetched and shows D1 as active.
        let snapshot = rx.borrow_and_update().clone();
        let d1 = listed(&snapshot.data.unwrap(), "D1");
        assert_eq!(d1.assigned_bus(), Some("B1"));

        let writes = h.api.writes();
        let reads = h.api.count(Method::GET, "/drivers");
        let err = h.coordinator.assign("D1", "B2").await.unwrap_err();
        assert_eq!(
            err,
            FleetError::ExclusivityViolation {
                driver_id: "D1".into(),
                assigned_to: "B1".into(),
            }
        );
        assert_eq!(h.overlay.get("B2").await, OverlaySelection::Unknown);
        assert_eq!(h.overlay.get("B1").await, OverlaySelection::Driver("D1".into()));
        // Fresh list served from cache; no network at all.
        assert_eq!(h.api.writes(), writes);
        assert_eq!(h.api.count(Method::GET, "/drivers"), reads);
    }

    #[tokio::test]
    async fn test_failed_network_reverts_to_empty_marker() {
        let h = harness().await;
        h.api.fail_path("/drivers/D2/assign");

        let err = h.coordinator.assign("D2", "B3").await.unwrap_err();
        assert!(matches!(err, FleetError::Network(_)));
        assert_eq!(h.overlay.get("B3").await, OverlaySelection::Unassigned);
    }

    #[tokio::test]
    async fn test_failed_network_restores_previous_selection() {
        let h = harness().await;
        h.coordinator.assign("D1", "B1").await.unwrap();

        h.api.fail_path("/drivers/D2/assign");
        h.coordinator.assign("D2", "B1").await.unwrap_err();
        assert_eq!(h.overlay.get("B1").await, OverlaySelection::Driver("D1".into()));
    }

    #[tokio::test]
    async fn test_server_rejection_reverts() {
        let h = harness().await;
        // The cached list predates D4, so only the server can reject it.
        h.cache.query(&Query::ListDrivers).await.unwrap();
        h.api.insert_driver(driver("D4", Some("B2")));

        let err = h.coordinator.assign("D4", "B1").await.unwrap_err();
        assert!(matches!(err, FleetError::Server { status: 409, .. }));
        assert_eq!(h.overlay.get("B1").await, OverlaySelection::Unassigned);
    }

    #[tokio::test]
    async fn test_preconditions_touch_nothing() {
        let h = harness().await;

        let err = h.coordinator.assign("", "B1").await.unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
        let err = h.coordinator.assign("D1", " ").await.unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        assert!(h.api.requests().is_empty());
        assert!(h.overlay.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_before_hydration() {
        let h = harness().await;
        let overlay = Arc::new(OverlayStore::new(
            Arc::new(MemoryStore::default()),
            "fleet.selectedDrivers",
        ));
        let coordinator = AssignmentCoordinator::new(h.cache.clone(), overlay.clone());

        let err = coordinator.assign("D1", "B1").await.unwrap_err();
        assert!(matches!(err, FleetError::NotReady(_)));
        assert!(h.api.requests().is_empty());

        overlay.hydrate().await;
        coordinator.assign("D1", "B1").await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_assign_same_bus_rejected() {
        let h = harness().await;
        h.cache.query(&Query::ListDrivers).await.unwrap();

        let release = h.api.hold_next();
        let first = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.assign("D1", "B1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.coordinator.is_in_flight("B1"));

        let err = h.coordinator.assign("D2", "B1").await.unwrap_err();
        assert_eq!(
            err,
            FleetError::AssignmentInProgress {
                bus_id: "B1".into()
            }
        );

        // A different bus is not blocked.
        h.coordinator.assign("D2", "B2").await.unwrap();

        release.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert!(!h.coordinator.is_in_flight("B1"));
        assert_eq!(h.overlay.get("B1").await, OverlaySelection::Driver("D1".into()));
    }

    #[tokio::test]
    async fn test_distinct_buses_settle_to_successful_assignments() {
        let h = harness().await;
        h.api.fail_path("/drivers/D3/assign");

        let results = tokio::join!(
            h.coordinator.assign("D1", "B1"),
            h.coordinator.assign("D2", "B2"),
            h.coordinator.assign("D3", "B3"),
        );
        assert!(results.0.is_ok());
        assert!(results.1.is_ok());
        assert!(results.2.is_err());

        let entries = h.overlay.entries().await;
        assert_eq!(entries["B1"], "D1");
        assert_eq!(entries["B2"], "D2");
        assert_eq!(entries["B3"], "");
    }

    #[tokio::test]
    async fn test_repeat_assignment_is_idempotent() {
        let h = harness().await;
        h.coordinator.assign("D1", "B1").await.unwrap();
        let overlay = h.overlay.entries().await;
        let record = h.api.driver_record("D1");

        h.coordinator.assign("D1", "B1").await.unwrap();
        assert_eq!(h.overlay.entries().await, overlay);
        assert_eq!(h.api.driver_record("D1"), record);
        assert_eq!(h.api.count(Method::PUT, "/drivers/D1/assign"), 2);
    }

    #[tokio::test]
    async fn test_exclusivity_uses_stale_list_when_refresh_fails() {
        let h = harness().await;
        let rx = h.cache.subscribe(&Query::ListDrivers).await;
        h.coordinator.assign("D1", "B1").await.unwrap();
        drop(rx);

        // The list now shows D1 on B1 but is stale and cannot be refreshed.
        h.cache.invalidate(&[Tag::list(TagKind::Driver)]).await;
        h.api.fail_path("/drivers");

        let err = h.coordinator.assign("D1", "B2").await.unwrap_err();
        assert!(matches!(err, FleetError::ExclusivityViolation { .. }));
    }

    #[tokio::test]
    async fn test_driver_list_unavailable_fails_without_writes() {
        let h = harness().await;
        h.api.fail_path("/drivers");

        let err = h.coordinator.assign("D1", "B1").await.unwrap_err();
        assert!(matches!(err, FleetError::Network(_)));
        assert!(h.overlay.entries().await.is_empty());
        assert_eq!(h.api.writes(), 0);
    }

    #[tokio::test]
    async fn test_settled_overlay_maps_each_driver_once() {
        let h = harness().await;
        h.coordinator.assign("D1", "B1").await.unwrap();
        h.coordinator.assign("D2", "B2").await.unwrap();
        let _ = h.coordinator.assign("D1", "B3").await;
        let _ = h.coordinator.assign("D2", "B1").await;

        let entries = h.overlay.entries().await;
        let mut targets: Vec<&String> = entries.values().filter(|d| !d.is_empty()).collect();
        let before = targets.len();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), before);
    }

    #[tokio::test]
    async fn test_stale_list_rejection_rereads_once_and_writes_nothing() {
        let h = harness().await;
        h.coordinator.assign("D1", "B1").await.unwrap();

        // Nobody watches the driver list, so the assignment left it stale.
        let reads = h.api.count(Method::GET, "/drivers");
        let writes = h.api.writes();
        let err = h.coordinator.assign("D1", "B2").await.unwrap_err();

        assert!(matches!(err, FleetError::ExclusivityViolation { .. }));
        assert_eq!(h.api.count(Method::GET, "/drivers"), reads + 1);
        assert_eq!(h.api.writes(), writes);
        assert_eq!(h.overlay.get("B2").await, OverlaySelection::Unknown);
    }
}
