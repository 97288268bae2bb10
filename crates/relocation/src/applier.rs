//! Applier: relocates one `Ready` row and records its movement.
//!
//! Nothing resolved during validation is trusted: test and process runs are
//! independent invocations, so the target location and the item are looked up
//! again right before writing. The update and the insert are both gated on the
//! item still being unprocessed; an affected-row count of 0 means another
//! processor got there first.

use chrono::Utc;
use tracing::{debug, warn};

use stockmove_core::{ErrorKind, ItemId, RelocationResult};

use crate::context::WarehouseContext;
use crate::gateway::ReconciliationGateway;
use crate::outcome::RowOutcome;
use crate::record::MovementRequest;
use crate::row::InventoryRow;
use crate::validator::{ReadyRelocation, already_correct};

/// What happened when a `Ready` row was applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Application {
    /// Item moved and movement recorded.
    Relocated,
    /// Item was already at the target when re-read.
    AlreadyCorrect,
    /// Target location vanished since validation.
    LocationNotFound,
    /// Item vanished or was processed since validation.
    ItemNotFound,
    /// Update affected 0 rows.
    NotUpdated,
    /// Insert affected 0 rows after a successful update.
    MovementNotRecorded,
}

impl Application {
    /// Whether the row's unit of work may be kept.
    ///
    /// A location change without its movement record must never persist.
    pub fn keeps_changes(&self) -> bool {
        !matches!(self, Application::MovementNotRecorded)
    }

    pub fn outcome(&self, row: &InventoryRow, ctx: &WarehouseContext) -> RowOutcome {
        let n = row.source_row_number;
        let label = row.label();
        match self {
            Application::Relocated => {
                RowOutcome::success(n, format!("{label}: Processed ID {} successfully.", row.id))
            }
            Application::AlreadyCorrect => RowOutcome::warning(n, already_correct(row)),
            Application::LocationNotFound => RowOutcome::error(
                n,
                ErrorKind::Lookup,
                format!(
                    "{label}: Location '{}' does not exist in warehouse '{}'.",
                    row.actual_location,
                    ctx.warehouse_name()
                ),
            ),
            Application::ItemNotFound => RowOutcome::error(
                n,
                ErrorKind::Lookup,
                format!(
                    "{label}: ID {} does not exist or is already processed.",
                    row.id
                ),
            ),
            Application::NotUpdated => RowOutcome::error(
                n,
                ErrorKind::Conflict,
                format!(
                    "{label}: ID {} was not updated. It may not exist or may already be processed.",
                    row.id
                ),
            ),
            Application::MovementNotRecorded => RowOutcome::error(
                n,
                ErrorKind::Conflict,
                format!(
                    "{label}: Failed to insert movement for ID {}. It may not exist or may be processed.",
                    row.id
                ),
            ),
        }
    }
}

/// Relocate the item of a validated row.
///
/// Runs inside the caller's unit of work; store failures propagate so the
/// caller can roll that unit back.
pub async fn apply<G>(
    gateway: &mut G,
    row: &InventoryRow,
    ready: &ReadyRelocation,
    ctx: &WarehouseContext,
) -> RelocationResult<Application>
where
    G: ReconciliationGateway + ?Sized,
{
    let warehouse = ctx.warehouse_name();
    let item_id = ItemId::new(row.id.as_str());

    let Some(target) = gateway
        .find_location(warehouse, &row.actual_location)
        .await?
    else {
        return Ok(Application::LocationNotFound);
    };
    if target.location_id != ready.target.location_id {
        debug!(
            row = row.source_row_number,
            validated = %ready.target.location_id,
            current = %target.location_id,
            "target location id changed since validation"
        );
    }

    let Some(item) = gateway.find_unprocessed_item(&item_id).await? else {
        return Ok(Application::ItemNotFound);
    };
    if item.location_id == target.location_id {
        return Ok(Application::AlreadyCorrect);
    }

    let updated = gateway
        .update_item_location(&item_id, target.location_id)
        .await?;
    if updated == 0 {
        warn!(row = row.source_row_number, item_id = %item_id, "item update affected no rows");
        return Ok(Application::NotUpdated);
    }

    let request = MovementRequest {
        item_id: item_id.clone(),
        source_warehouse: warehouse.to_string(),
        source_location: row.expected_location.clone(),
        destination_warehouse: warehouse.to_string(),
        destination_location: row.actual_location.clone(),
        user: ctx.acting_user().to_string(),
        occurred_at: Utc::now(),
    };
    let inserted = gateway.insert_movement(&request).await?;
    if inserted == 0 {
        warn!(row = row.source_row_number, item_id = %item_id, "movement insert affected no rows");
        return Ok(Application::MovementNotRecorded);
    }

    Ok(Application::Relocated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{InMemoryStore, StoreFault};
    use crate::outcome::Severity;
    use crate::record::ItemRecord;
    use crate::validator::{Classification, classify};
    use stockmove_core::{LocationId, ReferenceId};

    fn ctx() -> WarehouseContext {
        WarehouseContext::new("MAIN", "jdoe").unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_reference(9, "R1")
            .with_location(1, "MAIN", "L1")
            .with_location(2, "MAIN", "L2")
            .with_item(ItemRecord {
                item_id: ItemId::new("A1"),
                status: None,
                reference_id: ReferenceId::new(9),
                location_id: LocationId::new(1),
                quantity: 3.0,
                batch: Some("LOT-5".into()),
            })
    }

    fn row() -> InventoryRow {
        InventoryRow::new(2, "A1", "R1", "L2", "L1")
    }

    async fn ready(store: &mut InMemoryStore) -> ReadyRelocation {
        match classify(store, &row(), &ctx()).await.unwrap() {
            Classification::Ready(ready) => ready,
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn relocates_item_and_records_movement_with_row_mapping() {
        let mut store = store();
        let ready = ready(&mut store).await;

        let applied = apply(&mut store, &row(), &ready, &ctx()).await.unwrap();

        assert_eq!(applied, Application::Relocated);
        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(2));
        let [movement] = store.movements() else {
            panic!("expected exactly one movement");
        };
        assert_eq!(movement.destination_location, "L2");
        assert_eq!(movement.source_location, "L1");
        assert_eq!(movement.destination_warehouse, "MAIN");
        assert_eq!(movement.source_warehouse, "MAIN");
        assert_eq!(movement.user, "jdoe");
        assert_eq!(movement.quantity, 3.0);
        assert_eq!(movement.batch.as_deref(), Some("LOT-5"));

        let outcome = applied.outcome(&row(), &ctx());
        assert_eq!(outcome.severity, Severity::Success);
        assert_eq!(outcome.message, "Row 2: Processed ID A1 successfully.");
    }

    #[tokio::test]
    async fn rechecks_location_instead_of_trusting_validation() {
        let mut store = store();
        let ready = ready(&mut store).await;
        apply(&mut store, &row(), &ready, &ctx()).await.unwrap();

        let again = apply(&mut store, &row(), &ready, &ctx()).await.unwrap();

        assert_eq!(again, Application::AlreadyCorrect);
        assert_eq!(store.movements().len(), 1);
    }

    #[tokio::test]
    async fn lost_update_race_is_a_conflict() {
        let mut store = store().with_fault(StoreFault::UpdateRace(ItemId::new("A1")));
        let ready = ready(&mut store).await;

        let applied = apply(&mut store, &row(), &ready, &ctx()).await.unwrap();

        assert_eq!(applied, Application::NotUpdated);
        assert!(store.movements().is_empty());
        let outcome = applied.outcome(&row(), &ctx());
        assert_eq!(outcome.kind, Some(ErrorKind::Conflict));
        assert_eq!(
            outcome.message,
            "Row 2: ID A1 was not updated. It may not exist or may already be processed."
        );
    }

    #[tokio::test]
    async fn missing_movement_must_not_keep_changes() {
        let mut store = store().with_fault(StoreFault::MovementNotInserted(ItemId::new("A1")));
        let ready = ready(&mut store).await;

        let applied = apply(&mut store, &row(), &ready, &ctx()).await.unwrap();

        assert_eq!(applied, Application::MovementNotRecorded);
        assert!(!applied.keeps_changes());
    }

    #[tokio::test]
    async fn insert_failure_propagates() {
        let mut store = store().with_fault(StoreFault::MovementError(ItemId::new("A1")));
        let ready = ready(&mut store).await;

        let err = apply(&mut store, &row(), &ready, &ctx()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
