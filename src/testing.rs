//! Test doubles: an in-memory fleet server and key-value stores.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method as HttpMethod, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use once_cell::sync::Lazy;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::errors::{FleetError, FleetResult};
use crate::models::{Bus, Driver, RouteStop};
use crate::overlay::KeyValueStore;
use crate::remote::{ApiRequest, FleetApi};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("fleet_dashboard=debug")
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

pub fn bus(id: &str) -> Bus {
    Bus {
        id: id.to_string(),
        bus_number: "MH01 AB 1234".to_string(),
        bus_name: format!("Express {}", id),
        route_from: "Pune".to_string(),
        route_to: "Mumbai".to_string(),
        date: "2025-08-09".to_string(),
        departure_time: "07:00".to_string(),
        arrival_time: "10:00".to_string(),
        total_seats: 40,
        seats_booked: 0,
        price: 300.0,
        driver_id: None,
        route_stops: Vec::new(),
    }
}

pub fn driver(id: &str, assigned_to: Option<&str>) -> Driver {
    Driver {
        id: id.to_string(),
        driver_name: format!("Driver {}", id),
        phone_number: "+91 9876543210".to_string(),
        joined_at: None,
        assigned_to: assigned_to.map(str::to_string),
    }
}

#[derive(Default)]
struct FakeState {
    buses: Vec<Bus>,
    drivers: Vec<Driver>,
    requests: Vec<ApiRequest>,
    fail_paths: HashSet<String>,
    gates: VecDeque<oneshot::Receiver<()>>,
    next_id: u64,
}

/// In-memory stand-in for the remote fleet API.
///
/// Responses are computed when the request arrives; a gate registered with
/// [`FakeFleetApi::hold_next`] only delays their delivery.
#[derive(Default)]
pub struct FakeFleetApi {
    state: Mutex<FakeState>,
}

impl FakeFleetApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bus(&self, bus: Bus) {
        self.state.lock().unwrap().buses.push(bus);
    }

    pub fn insert_driver(&self, driver: Driver) {
        let mut state = self.state.lock().unwrap();
        if let Some(bus_id) = driver.assigned_bus() {
            if let Some(bus) = state.buses.iter_mut().find(|b| b.id == bus_id) {
                bus.driver_id = Some(driver.id.clone());
            }
        }
        state.drivers.push(driver);
    }

    pub fn rename_driver(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(driver) = state.drivers.iter_mut().find(|d| d.id == id) {
            driver.driver_name = name.to_string();
        }
    }

    pub fn driver_record(&self, id: &str) -> Option<Driver> {
        let state = self.state.lock().unwrap();
        state.drivers.iter().find(|d| d.id == id).cloned()
    }

    /// Fail every request whose path (without query string) equals `path`.
    pub fn fail_path(&self, path: &str) {
        self.state.lock().unwrap().fail_paths.insert(path.to_string());
    }

    /// Hold the response of the next request until the sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().gates.push_back(rx);
        tx
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests with `method` on `path`, ignoring query strings.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && strip_query(&r.path) == path)
            .count()
    }

    /// Number of writes (anything but GET) sent so far.
    pub fn writes(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method != Method::GET)
            .count()
    }
}

#[async_trait]
impl FleetApi for FakeFleetApi {
    async fn execute(&self, request: ApiRequest) -> FleetResult<Value> {
        let (result, gate) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            let gate = state.gates.pop_front();
            let result = if state.fail_paths.contains(strip_query(&request.path)) {
                Err(FleetError::Network(format!("connection refused: {}", request)))
            } else {
                state.handle(&request)
            };
            (result, gate)
        };

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        result
    }
}

fn strip_query(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

fn not_found(what: &str) -> FleetError {
    FleetError::Server {
        status: 404,
        message: format!("{} not found", what),
    }
}

fn merge(target: &mut Value, changes: &Value) {
    if let (Some(target), Some(changes)) = (target.as_object_mut(), changes.as_object()) {
        for (key, value) in changes {
            target.insert(key.clone(), value.clone());
        }
    }
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn bus_mut(&mut self, id: &str) -> FleetResult<&mut Bus> {
        self.buses
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found("Bus"))
    }

    fn handle(&mut self, request: &ApiRequest) -> FleetResult<Value> {
        let path = strip_query(&request.path);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let body = request.body.clone().unwrap_or(Value::Null);

        match (request.method.clone(), segments.as_slice()) {
            (Method::GET, ["routes"]) => Ok(json!({
                "routes": self.buses,
                "pagination": { "total": self.buses.len() },
            })),
            (Method::GET, ["routes", "stats"]) => Ok(json!({
                "totalRoutes": self.buses.len(),
                "totalSeats": self.buses.iter().map(|b| b.total_seats).sum::<u32>(),
                "seatsBooked": self.buses.iter().map(|b| b.seats_booked).sum::<u32>(),
            })),
            (Method::GET, ["routes", "today-trips"]) => Ok(json!(self.buses)),
            (Method::GET, ["routes", id]) => self
                .buses
                .iter()
                .find(|b| b.id == *id)
                .map(|b| json!(b))
                .ok_or_else(|| not_found("Bus")),
            (Method::POST, ["routes"]) => {
                let mut value = body;
                merge(&mut value, &json!({ "_id": self.next_id("R") }));
                let mut bus: Bus = serde_json::from_value(value)?;
                for index in 0..bus.route_stops.len() {
                    bus.route_stops[index].id = self.next_id("S");
                }
                self.buses.push(bus.clone());
                Ok(json!(bus))
            }
            (Method::GET, ["routes", id, "stops"]) => Ok(json!(self.bus_mut(id)?.route_stops)),
            (Method::POST, ["routes", id, "stops"]) => {
                let mut value = body;
                merge(&mut value, &json!({ "_id": self.next_id("S") }));
                let stop: RouteStop = serde_json::from_value(value)?;
                let bus = self.bus_mut(id)?;
                bus.route_stops.push(stop.clone());
                bus.route_stops.sort_by_key(|s| s.stop_order);
                Ok(json!(stop))
            }
            (Method::PUT, ["routes", id, "stops", stop_id]) => {
                let bus = self.bus_mut(id)?;
                let stop = bus
                    .route_stops
                    .iter_mut()
                    .find(|s| s.id == *stop_id)
                    .ok_or_else(|| not_found("Stop"))?;
                let mut value = json!(stop);
                merge(&mut value, &body);
                *stop = serde_json::from_value(value.clone())?;
                Ok(value)
            }
            (Method::DELETE, ["routes", id, "stops", stop_id]) => {
                let bus = self.bus_mut(id)?;
                let before = bus.route_stops.len();
                bus.route_stops.retain(|s| s.id != *stop_id);
                if bus.route_stops.len() == before {
                    return Err(not_found("Stop"));
                }
                Ok(json!({ "deleted": stop_id }))
            }
            (Method::PUT, ["routes", id]) => {
                let index = self
                    .buses
                    .iter()
                    .position(|b| b.id == *id)
                    .ok_or_else(|| not_found("Bus"))?;
                let mut value = json!(self.buses[index]);
                merge(&mut value, &body);
                self.buses[index] = serde_json::from_value(value.clone())?;
                Ok(value)
            }
            (Method::DELETE, ["routes", id]) => {
                let before = self.buses.len();
                self.buses.retain(|b| b.id != *id);
                if self.buses.len() == before {
                    return Err(not_found("Bus"));
                }
                for driver in &mut self.drivers {
                    if driver.assigned_bus() == Some(*id) {
                        driver.assigned_to = None;
                    }
                }
                Ok(json!({ "deleted": id }))
            }
            (Method::GET, ["drivers"]) => Ok(json!(self.drivers)),
            (Method::GET, ["drivers", id]) => self
                .drivers
                .iter()
                .find(|d| d.id == *id)
                .map(|d| json!(d))
                .ok_or_else(|| not_found("Driver")),
            (Method::POST, ["drivers"]) => {
                let driver = Driver {
                    id: self.next_id("N"),
                    driver_name: body["name"].as_str().unwrap_or_default().to_string(),
                    phone_number: body["phoneNumber"].as_str().unwrap_or_default().to_string(),
                    joined_at: body["joinedAt"].as_str().map(str::to_string),
                    assigned_to: None,
                };
                self.drivers.push(driver.clone());
                Ok(json!(driver))
            }
            (Method::PUT, ["drivers", id, "assign"]) => self.assign(id, &body),
            (Method::PUT, ["drivers", id]) => {
                let driver = self
                    .drivers
                    .iter_mut()
                    .find(|d| d.id == *id)
                    .ok_or_else(|| not_found("Driver"))?;
                if let Some(name) = body["name"].as_str() {
                    driver.driver_name = name.to_string();
                }
                if let Some(phone) = body["phoneNumber"].as_str() {
                    driver.phone_number = phone.to_string();
                }
                Ok(json!(driver))
            }
            (Method::DELETE, ["drivers", id]) => {
                let before = self.drivers.len();
                self.drivers.retain(|d| d.id != *id);
                if self.drivers.len() == before {
                    return Err(not_found("Driver"));
                }
                for bus in &mut self.buses {
                    if bus.driver_id.as_deref() == Some(*id) {
                        bus.driver_id = None;
                    }
                }
                Ok(json!({ "deleted": id }))
            }
            _ => Err(not_found("Endpoint")),
        }
    }

    fn assign(&mut self, driver_id: &str, body: &Value) -> FleetResult<Value> {
        let bus_id = body["busId"].as_str().unwrap_or_default().to_string();
        if !self.buses.iter().any(|b| b.id == bus_id) {
            return Err(not_found("Bus"));
        }
        let current = self
            .drivers
            .iter()
            .find(|d| d.id == driver_id)
            .ok_or_else(|| not_found("Driver"))?;
        if let Some(other) = current.assigned_bus() {
            if other != bus_id {
                return Err(FleetError::Server {
                    status: 409,
                    message: format!("Driver already assigned to {}", other),
                });
            }
        }

        for driver in &mut self.drivers {
            if driver.id != driver_id && driver.assigned_bus() == Some(bus_id.as_str()) {
                driver.assigned_to = None;
            }
        }
        for bus in &mut self.buses {
            if bus.id == bus_id {
                bus.driver_id = Some(driver_id.to_string());
            }
        }

        let driver = self
            .drivers
            .iter_mut()
            .find(|d| d.id == driver_id)
            .ok_or_else(|| not_found("Driver"))?;
        driver.assigned_to = Some(bus_id);
        Ok(json!(driver))
    }
}

/// Serve a [`FakeFleetApi`] over HTTP with the remote `{ data }` envelope.
pub fn remote_router(api: Arc<FakeFleetApi>) -> Router {
    Router::new().fallback(serve_remote).with_state(api)
}

async fn serve_remote(
    State(api): State<Arc<FakeFleetApi>>,
    method: HttpMethod,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let path = path.strip_prefix("/api").unwrap_or(&path).to_string();
    let body = serde_json::from_slice(&body).ok();
    let method = Method::from_bytes(method.as_str().as_bytes()).unwrap();

    match api.execute(ApiRequest { method, path, body }).await {
        Ok(data) => Json(json!({ "data": data })).into_response(),
        Err(FleetError::Server { status, message }) => (
            StatusCode::from_u16(status).unwrap(),
            Json(json!({ "message": message })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": e.message() })),
        )
            .into_response(),
    }
}

/// Key-value store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> FleetResult<Option<String>> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> FleetResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Key-value store whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn seed(&self, key: &str, value: &str) {
        self.inner
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.raw(key)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> FleetResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FleetError::Persistence("disk I/O error".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> FleetResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FleetError::Persistence("disk full".to_string()));
        }
        self.inner.set(key, value).await
    }
}
