//! Store access for the relocation engine (mechanics only).
//!
//! The engine never talks SQL. It needs five point operations, each a single
//! round trip, plus a way to delimit units of work:
//!
//! - **Lookups** return `Option`; absence is a classification, not an error.
//! - **Writes** return the affected-row count. A count of 0 is how stale state
//!   (item processed or removed since it was read) is detected; callers must
//!   treat it as a conflict.
//! - **Units of work** are nested inside the session's transaction. The
//!   gateway never opens or closes the outer transaction on its own; the
//!   caller decides when to [`UnitOfWork::commit`] or [`UnitOfWork::rollback`].
//!
//! Implementations must bind every value as a parameter.

use async_trait::async_trait;

use stockmove_core::{ItemId, LocationId, StoreResult};

use crate::record::{ItemRecord, LocationRecord, MovementRequest, ReferenceRecord};

/// Query/command surface used by the validator and the applier.
#[async_trait]
pub trait ReconciliationGateway: Send {
    /// Item by id, only while its status is unset.
    async fn find_unprocessed_item(&mut self, item_id: &ItemId) -> StoreResult<Option<ItemRecord>>;

    /// Reference by its code.
    async fn find_reference(&mut self, code: &str) -> StoreResult<Option<ReferenceRecord>>;

    /// Location by warehouse and location code.
    async fn find_location(
        &mut self,
        warehouse: &str,
        code: &str,
    ) -> StoreResult<Option<LocationRecord>>;

    /// Point the item at `location_id`, only while its status is unset.
    async fn update_item_location(
        &mut self,
        item_id: &ItemId,
        location_id: LocationId,
    ) -> StoreResult<u64>;

    /// Append a relocation movement sourced from the item's current row
    /// (quantity, batch, reference), only while its status is unset.
    async fn insert_movement(&mut self, request: &MovementRequest) -> StoreResult<u64>;
}

/// Transaction boundaries of one exclusively-owned store session.
#[async_trait]
pub trait UnitOfWork: ReconciliationGateway {
    /// Open a nested unit (one row).
    async fn begin_unit(&mut self) -> StoreResult<()>;

    /// Keep the innermost unit's changes.
    async fn commit_unit(&mut self) -> StoreResult<()>;

    /// Discard the innermost unit's changes.
    async fn rollback_unit(&mut self) -> StoreResult<()>;

    /// Make everything done in the session durable.
    async fn commit(&mut self) -> StoreResult<()>;

    /// Discard everything done in the session.
    async fn rollback(&mut self) -> StoreResult<()>;
}
