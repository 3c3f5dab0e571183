//! Durable bus -> driver overlay.
//!
//! Holds the operator's most recent assignment choice per bus, written before
//! the server confirms it. The whole map is persisted as one JSON value under
//! a single key and hydrated once at startup.
//!
//! An empty driver id is the explicit "unassigned" marker; a missing bus is
//! "unknown". Persistence failures never fail the caller: the store logs them
//! and keeps working from memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::errors::FleetResult;

/// Asynchronous key-value persistence substrate.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> FleetResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> FleetResult<()>;

    async fn get_or(&self, key: &str, default: String) -> FleetResult<String> {
        Ok(self.get(key).await?.unwrap_or(default))
    }
}

/// What the overlay knows about one bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlaySelection {
    Unknown,
    Unassigned,
    Driver(String),
}

impl OverlaySelection {
    fn from_stored(value: Option<&String>) -> Self {
        match value.map(String::as_str) {
            None => OverlaySelection::Unknown,
            Some("") => OverlaySelection::Unassigned,
            Some(driver) => OverlaySelection::Driver(driver.to_string()),
        }
    }

    /// Value to restore when reverting; unknown reverts to the unassigned marker.
    pub fn revert_value(&self) -> &str {
        match self {
            OverlaySelection::Driver(driver) => driver,
            OverlaySelection::Unknown | OverlaySelection::Unassigned => "",
        }
    }

    pub fn driver_id(&self) -> Option<&str> {
        match self {
            OverlaySelection::Driver(driver) => Some(driver),
            _ => None,
        }
    }
}

/// Serializable view of the overlay for the presentation layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OverlayView {
    pub entries: BTreeMap<String, String>,
    pub hydrated: bool,
    pub degraded: bool,
}

#[derive(Default)]
struct OverlayState {
    entries: BTreeMap<String, String>,
    generation: u64,
    hydrated: bool,
    degraded: bool,
    /// Set when hydration could not read storage; writing would clobber it
    writes_suppressed: bool,
}

/// In-memory overlay mirrored to a [`KeyValueStore`].
pub struct OverlayStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    state: RwLock<OverlayState>,
    /// Serializes writes; holds the last generation persisted
    persisted: Mutex<u64>,
}

impl OverlayStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            state: RwLock::new(OverlayState::default()),
            persisted: Mutex::new(0),
        }
    }

    /// Load the persisted overlay. Only the first call reads storage.
    pub async fn hydrate(&self) {
        if self.state.read().await.hydrated {
            return;
        }

        let loaded = self.store.get_or(&self.key, "{}".to_string()).await;

        let mut state = self.state.write().await;
        if state.hydrated {
            return;
        }
        match loaded {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => {
                    tracing::info!("Overlay hydrated with {} entries", entries.len());
                    state.entries = entries;
                }
                Err(e) => {
                    tracing::warn!(
                        "Stored overlay under {} is corrupt, starting empty: {}",
                        self.key,
                        e
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Overlay could not be read, keeping it in memory only: {}",
                    e
                );
                state.degraded = true;
                state.writes_suppressed = true;
            }
        }
        state.hydrated = true;
    }

    pub async fn is_hydrated(&self) -> bool {
        self.state.read().await.hydrated
    }

    pub async fn is_degraded(&self) -> bool {
        self.state.read().await.degraded
    }

    pub async fn get(&self, bus_id: &str) -> OverlaySelection {
        OverlaySelection::from_stored(self.state.read().await.entries.get(bus_id))
    }

    pub async fn entries(&self) -> BTreeMap<String, String> {
        self.state.read().await.entries.clone()
    }

    pub async fn view(&self) -> OverlayView {
        let state = self.state.read().await;
        OverlayView {
            entries: state.entries.clone(),
            hydrated: state.hydrated,
            degraded: state.degraded,
        }
    }

    /// Record `bus_id -> driver_id` (empty string = unassigned) and persist.
    pub async fn set(&self, bus_id: &str, driver_id: &str) {
        self.update(|entries| {
            entries.insert(bus_id.to_string(), driver_id.to_string());
        })
        .await;
    }

    /// Drop the entry for a bus that no longer exists.
    pub async fn forget_bus(&self, bus_id: &str) {
        self.update(|entries| {
            entries.remove(bus_id);
        })
        .await;
    }

    /// Mark every bus pointing at `driver_id` as unassigned.
    pub async fn release_driver(&self, driver_id: &str) {
        self.update(|entries| {
            for value in entries.values_mut() {
                if value == driver_id {
                    value.clear();
                }
            }
        })
        .await;
    }

    /// Persist the latest state; used at shutdown and to retry failed writes.
    pub async fn flush(&self) {
        let (generation, raw) = {
            let state = self.state.read().await;
            (state.generation, serialize(&state.entries))
        };
        if let Some(raw) = raw {
            self.persist(generation, raw).await;
        }
    }

    async fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) {
        let (generation, raw) = {
            let mut state = self.state.write().await;
            apply(&mut state.entries);
            state.generation += 1;
            (state.generation, serialize(&state.entries))
        };
        if let Some(raw) = raw {
            self.persist(generation, raw).await;
        }
    }

    async fn persist(&self, generation: u64, raw: String) {
        let mut persisted = self.persisted.lock().await;
        if generation <= *persisted {
            // A later snapshot already reached storage.
            return;
        }
        if self.state.read().await.writes_suppressed {
            return;
        }

        match self.store.set(&self.key, &raw).await {
            Ok(()) => {
                *persisted = generation;
                let mut state = self.state.write().await;
                if state.degraded {
                    tracing::info!("Overlay persistence recovered");
                    state.degraded = false;
                }
            }
            Err(e) => {
                tracing::warn!("Overlay write failed, continuing in memory: {}", e);
                self.state.write().await.degraded = true;
            }
        }
    }
}

fn serialize(entries: &BTreeMap<String, String>) -> Option<String> {
    match serde_json::to_string(entries) {
        Ok(raw) => Some(raw),
        Err(e) => {
            tracing::error!("Failed to serialize overlay: {}", e);
            None
        }
    }
}
