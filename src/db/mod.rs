//! Durable local state.
//!
//! A single SQLite table of string keys and values backs the overlay. The
//! remote server remains the source of truth; nothing stored here is
//! authoritative.

mod repository;

pub use repository::*;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::errors::{FleetError, FleetResult};
use crate::overlay::KeyValueStore;

/// Overlay traffic is a single key.
const MAX_CONNECTIONS: u32 = 2;

/// Open (creating if needed) the SQLite file and make sure the schema exists.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!("Could not create {:?}: {}", parent, e);
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await?;

    tracing::debug!("Overlay database ready at {:?}", db_path);
    Ok(pool)
}

/// Stand-in used when the database could not be opened. Every call fails, so
/// the overlay runs degraded and in memory only.
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> FleetError {
        FleetError::Persistence(format!("Overlay database unavailable: {}", self.reason))
    }
}

#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _key: &str) -> FleetResult<Option<String>> {
        Err(self.error())
    }

    async fn set(&self, _key: &str, _value: &str) -> FleetResult<()> {
        Err(self.error())
    }
}
