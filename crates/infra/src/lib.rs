//! Infrastructure layer: SQL store, configuration, background execution.

pub mod config;
pub mod schema;
pub mod sqlite;
pub mod worker;


pub use config::StoreConfig;
pub use schema::ensure_schema;
pub use sqlite::{SqliteSession, SqliteStore};
pub use worker::{BatchHandle, spawn_batch};
