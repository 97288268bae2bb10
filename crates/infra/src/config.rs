//! Store configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use stockmove_core::{RelocationError, RelocationResult, StoreError, StoreResult};

pub const DATABASE_URL_VAR: &str = "STOCKMOVE_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "STOCKMOVE_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_VAR: &str = "STOCKMOVE_ACQUIRE_TIMEOUT_SECS";
pub const BUSY_TIMEOUT_VAR: &str = "STOCKMOVE_BUSY_TIMEOUT_SECS";

/// Connection settings for the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
    /// How long SQLite waits on a locked database before failing a statement.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://stockmove.db".to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Read `STOCKMOVE_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> RelocationResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RelocationResult<Self> {
        let defaults = Self::default();

        let database_url = lookup(DATABASE_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.database_url);
        let max_connections = parse_var(&lookup, MAX_CONNECTIONS_VAR)?
            .unwrap_or(defaults.max_connections);
        let acquire_timeout = parse_var::<u64>(&lookup, ACQUIRE_TIMEOUT_VAR)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);
        let busy_timeout = parse_var::<u64>(&lookup, BUSY_TIMEOUT_VAR)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.busy_timeout);

        if max_connections == 0 {
            return Err(RelocationError::input(format!(
                "{MAX_CONNECTIONS_VAR} must be at least 1"
            )));
        }

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout,
            busy_timeout,
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Open a connection pool. The database file is created if missing.
    pub async fn connect(&self) -> StoreResult<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(|e| StoreError::Connection(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(self.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(
            max_connections = self.max_connections,
            "connected to relocation store"
        );
        Ok(pool)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> RelocationResult<Option<T>>
where
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RelocationError::input(format!("{key}={raw:?}: {e}"))),
    }
}
