//! Minimum schema the relocation engine needs.
//!
//! Production databases already carry these tables; `ensure_schema` exists for
//! fresh development databases and tests. Statements are idempotent.

use sqlx::SqlitePool;
use tracing::debug;

use stockmove_core::StoreResult;

use crate::sqlite::map_sqlx_error;

const STATEMENTS: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS "references" (
        reference_id INTEGER PRIMARY KEY,
        reference    TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        location_id INTEGER PRIMARY KEY,
        warehouse   TEXT NOT NULL,
        location    TEXT NOT NULL,
        UNIQUE (warehouse, location)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        item_id      TEXT PRIMARY KEY,
        status       TEXT NULL,
        reference_id INTEGER NOT NULL REFERENCES "references" (reference_id),
        location_id  INTEGER NOT NULL REFERENCES locations (location_id),
        quantity     REAL NOT NULL DEFAULT 0,
        batch        TEXT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        movement_id           INTEGER PRIMARY KEY AUTOINCREMENT,
        movement_type         TEXT NOT NULL,
        reference_id          INTEGER NOT NULL,
        item_id               TEXT NOT NULL,
        quantity              REAL NOT NULL,
        units                 REAL NOT NULL,
        source_warehouse      TEXT NOT NULL,
        source_location       TEXT NOT NULL,
        destination_warehouse TEXT NOT NULL,
        destination_location  TEXT NOT NULL,
        date                  TEXT NOT NULL,
        "user"                TEXT NOT NULL,
        notes                 TEXT NULL,
        cancelled             INTEGER NOT NULL DEFAULT 0,
        identifier            TEXT NULL,
        destination_item_id   TEXT NULL,
        identifier_type       TEXT NULL,
        terminal_id           TEXT NULL,
        sequence              INTEGER NULL,
        batch                 TEXT NULL,
        destination_quantity  REAL NULL,
        movement_block        TEXT NULL,
        message_sent          INTEGER NOT NULL DEFAULT 0,
        sent_date             TEXT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS movements_item_id ON movements (item_id)
    "#,
];

/// Create the relocation tables if they do not exist.
pub async fn ensure_schema(pool: &SqlitePool) -> StoreResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    debug!("relocation schema ensured");
    Ok(())
}
