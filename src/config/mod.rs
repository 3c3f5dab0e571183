//! Configuration module for the fleet dashboard.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{FleetError, FleetResult};

/// Default persistence key holding the bus -> driver overlay.
pub const DEFAULT_OVERLAY_KEY: &str = "fleet.selectedDrivers";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote fleet API (e.g. `http://host/api`)
    pub api_base_url: String,
    /// Path to the SQLite file backing the overlay store
    pub db_path: PathBuf,
    /// Address the local dashboard surface binds to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Timeout applied to every remote request
    pub request_timeout: Duration,
    /// Namespaced key under which the overlay is persisted
    pub overlay_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> FleetResult<Self> {
        dotenvy::dotenv().ok();

        let api_base_url = env::var("FLEET_API_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5000/api".to_string())
            .trim_end_matches('/')
            .to_string();

        let db_path = env::var("FLEET_DB_PATH")
            .unwrap_or_else(|_| "./data/overlay.sqlite".to_string())
            .into();

        let bind_addr = env::var("FLEET_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| FleetError::Config(format!("Invalid FLEET_BIND_ADDR: {}", e)))?;

        let log_level = env::var("FLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let timeout_secs: u64 = env::var("FLEET_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|e| {
                FleetError::Config(format!("Invalid FLEET_REQUEST_TIMEOUT_SECS: {}", e))
            })?;

        let overlay_key =
            env::var("FLEET_OVERLAY_KEY").unwrap_or_else(|_| DEFAULT_OVERLAY_KEY.to_string());
        if overlay_key.trim().is_empty() {
            return Err(FleetError::Config(
                "FLEET_OVERLAY_KEY must not be empty".to_string(),
            ));
        }

        Ok(Self {
            api_base_url,
            db_path,
            bind_addr,
            log_level,
            request_timeout: Duration::from_secs(timeout_secs),
            overlay_key,
        })
    }
}
