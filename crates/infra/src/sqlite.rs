//! SQLite-backed reconciliation gateway.
//!
//! ## Sessions
//!
//! [`SqliteStore::begin_session`] opens one transaction and hands it out as a
//! [`SqliteSession`]. The session is the only thing the batch runner writes
//! through; it is owned by exactly one run at a time. Row units are SQL
//! savepoints nested inside that transaction.
//!
//! Dropping a session without committing rolls the transaction back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `PoolTimedOut`, `PoolClosed`, `Io`, `Tls` | `Connection` |
//! | `Database`, `RowNotFound`, decode errors, other | `Query { operation, .. }` |

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::instrument;

use stockmove_core::{ItemId, LocationId, ReferenceId, StoreError, StoreResult};
use stockmove_relocation::{
    ItemRecord, LocationRecord, MOVEMENT_NOTES, MovementRecord, MovementRequest, RELOCATION,
    ReconciliationGateway, ReferenceRecord, UnitOfWork,
};

/// Pool handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction-scoped session for one batch run.
    #[instrument(skip(self), err)]
    pub async fn begin_session(&self) -> StoreResult<SqliteSession> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_session", e))?;
        Ok(SqliteSession {
            tx: Some(tx),
            depth: 0,
        })
    }

    /// Distinct warehouse names known to the store, for warehouse pickers.
    #[instrument(skip(self), err)]
    pub async fn list_warehouses(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT warehouse FROM locations ORDER BY warehouse")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_warehouses", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("warehouse")
                    .map_err(|e| map_sqlx_error("list_warehouses", e))
            })
            .collect()
    }

    /// Audit trail of one item, oldest first.
    #[instrument(skip(self, item_id), fields(item_id = %item_id), err)]
    pub async fn movements_for(&self, item_id: &ItemId) -> StoreResult<Vec<MovementRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                movement_type,
                reference_id,
                item_id,
                quantity,
                units,
                source_warehouse,
                source_location,
                destination_warehouse,
                destination_location,
                date,
                "user",
                notes,
                cancelled,
                batch
            FROM movements
            WHERE item_id = ?1
            ORDER BY movement_id ASC
            "#,
        )
        .bind(item_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_for", e))?;

        rows.iter()
            .map(|row| movement_from_row(row).map_err(|e| map_sqlx_error("movements_for", e)))
            .collect()
    }
}

/// One batch run's transaction.
pub struct SqliteSession {
    tx: Option<Transaction<'static, Sqlite>>,
    depth: usize,
}

impl core::fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SqliteSession")
            .field("open", &self.tx.is_some())
            .field("depth", &self.depth)
            .finish()
    }
}

impl SqliteSession {
    fn conn(&mut self) -> StoreResult<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Transaction("session already finished".into()))
    }

    async fn savepoint_command(&mut self, operation: &str, sql: String) -> StoreResult<()> {
        let conn = self.conn()?;
        sqlx::query(&sql)
            .execute(conn)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(())
    }

    fn savepoint_name(&self) -> String {
        format!("row_unit_{}", self.depth)
    }
}

#[async_trait]
impl ReconciliationGateway for SqliteSession {
    #[instrument(skip(self, item_id), fields(item_id = %item_id), err)]
    async fn find_unprocessed_item(&mut self, item_id: &ItemId) -> StoreResult<Option<ItemRecord>> {
        let conn = self.conn()?;
        let row = sqlx::query(
            r#"
            SELECT item_id, status, reference_id, location_id, quantity, batch
            FROM items
            WHERE item_id = ?1 AND status IS NULL
            LIMIT 1
            "#,
        )
        .bind(item_id.as_str())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("find_unprocessed_item", e))?;

        row.as_ref()
            .map(item_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_unprocessed_item", e))
    }

    #[instrument(skip(self), err)]
    async fn find_reference(&mut self, code: &str) -> StoreResult<Option<ReferenceRecord>> {
        let conn = self.conn()?;
        let row = sqlx::query(
            r#"
            SELECT reference_id, reference
            FROM "references"
            WHERE reference = ?1
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("find_reference", e))?;

        row.as_ref()
            .map(|row| -> Result<_, sqlx::Error> {
                Ok(ReferenceRecord {
                    reference_id: ReferenceId::new(row.try_get("reference_id")?),
                    reference: row.try_get("reference")?,
                })
            })
            .transpose()
            .map_err(|e| map_sqlx_error("find_reference", e))
    }

    #[instrument(skip(self), err)]
    async fn find_location(
        &mut self,
        warehouse: &str,
        code: &str,
    ) -> StoreResult<Option<LocationRecord>> {
        let conn = self.conn()?;
        let row = sqlx::query(
            r#"
            SELECT location_id, warehouse, location
            FROM locations
            WHERE warehouse = ?1 AND location = ?2
            LIMIT 1
            "#,
        )
        .bind(warehouse)
        .bind(code)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("find_location", e))?;

        row.as_ref()
            .map(|row| -> Result<_, sqlx::Error> {
                Ok(LocationRecord {
                    location_id: LocationId::new(row.try_get("location_id")?),
                    warehouse: row.try_get("warehouse")?,
                    location: row.try_get("location")?,
                })
            })
            .transpose()
            .map_err(|e| map_sqlx_error("find_location", e))
    }

    #[instrument(skip(self, item_id, location_id), fields(item_id = %item_id, location_id = %location_id), err)]
    async fn update_item_location(
        &mut self,
        item_id: &ItemId,
        location_id: LocationId,
    ) -> StoreResult<u64> {
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            UPDATE items
            SET location_id = ?1
            WHERE item_id = ?2 AND status IS NULL
            "#,
        )
        .bind(location_id.get())
        .bind(item_id.as_str())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("update_item_location", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, request), fields(item_id = %request.item_id), err)]
    async fn insert_movement(&mut self, request: &MovementRequest) -> StoreResult<u64> {
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            INSERT INTO movements (
                movement_type,
                reference_id,
                item_id,
                quantity,
                units,
                source_warehouse,
                source_location,
                destination_warehouse,
                destination_location,
                date,
                "user",
                notes,
                cancelled,
                batch,
                message_sent
            )
            SELECT
                ?1,
                i.reference_id,
                i.item_id,
                i.quantity,
                CASE WHEN i.quantity > 0 THEN 1.0 ELSE 0.0 END,
                ?2,
                ?3,
                ?4,
                ?5,
                ?6,
                ?7,
                ?8,
                0,
                i.batch,
                0
            FROM items i
            WHERE i.item_id = ?9 AND i.status IS NULL
            "#,
        )
        .bind(RELOCATION)
        .bind(&request.source_warehouse)
        .bind(&request.source_location)
        .bind(&request.destination_warehouse)
        .bind(&request.destination_location)
        .bind(request.occurred_at)
        .bind(&request.user)
        .bind(MOVEMENT_NOTES)
        .bind(request.item_id.as_str())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UnitOfWork for SqliteSession {
    async fn begin_unit(&mut self) -> StoreResult<()> {
        self.depth += 1;
        let sql = format!("SAVEPOINT {}", self.savepoint_name());
        if let Err(err) = self.savepoint_command("begin_unit", sql).await {
            self.depth -= 1;
            return Err(err);
        }
        Ok(())
    }

    async fn commit_unit(&mut self) -> StoreResult<()> {
        if self.depth == 0 {
            return Err(StoreError::Transaction("no open unit to commit".into()));
        }
        let sql = format!("RELEASE SAVEPOINT {}", self.savepoint_name());
        self.savepoint_command("commit_unit", sql).await?;
        self.depth -= 1;
        Ok(())
    }

    async fn rollback_unit(&mut self) -> StoreResult<()> {
        if self.depth == 0 {
            return Err(StoreError::Transaction("no open unit to roll back".into()));
        }
        let name = self.savepoint_name();
        // ROLLBACK TO keeps the savepoint on SQLite's stack; RELEASE pops it.
        self.savepoint_command("rollback_unit", format!("ROLLBACK TO SAVEPOINT {name}"))
            .await?;
        self.savepoint_command("rollback_unit", format!("RELEASE SAVEPOINT {name}"))
            .await?;
        self.depth -= 1;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Transaction("session already finished".into()))?;
        self.depth = 0;
        tx.commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("commit failed: {e}")))
    }

    /// Idempotent: rolling back a finished session is a no-op.
    async fn rollback(&mut self) -> StoreResult<()> {
        self.depth = 0;
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| StoreError::Transaction(format!("rollback failed: {e}"))),
            None => Ok(()),
        }
    }
}

fn item_from_row(row: &SqliteRow) -> Result<ItemRecord, sqlx::Error> {
    Ok(ItemRecord {
        item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
        status: row.try_get("status")?,
        reference_id: ReferenceId::new(row.try_get("reference_id")?),
        location_id: LocationId::new(row.try_get("location_id")?),
        quantity: row.try_get("quantity")?,
        batch: row.try_get("batch")?,
    })
}

fn movement_from_row(row: &SqliteRow) -> Result<MovementRecord, sqlx::Error> {
    Ok(MovementRecord {
        movement_type: row.try_get("movement_type")?,
        reference_id: ReferenceId::new(row.try_get("reference_id")?),
        item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
        quantity: row.try_get("quantity")?,
        units: row.try_get("units")?,
        source_warehouse: row.try_get("source_warehouse")?,
        source_location: row.try_get("source_location")?,
        destination_warehouse: row.try_get("destination_warehouse")?,
        destination_location: row.try_get("destination_location")?,
        date: row.try_get("date")?,
        user: row.try_get("user")?,
        notes: row.try_get::<Option<String>, _>("notes")?.unwrap_or_default(),
        cancelled: row.try_get::<i64, _>("cancelled")? != 0,
        batch: row.try_get("batch")?,
    })
}

/// Map sqlx errors to store errors.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("timed out acquiring connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => StoreError::query(operation, db_err.message()),
        other => StoreError::query(operation, other.to_string()),
    }
}
