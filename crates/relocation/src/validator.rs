//! Row validator: pure decision logic over point lookups.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. required fields present
//! 2. item exists and is unprocessed
//! 3. reference exists
//! 4. item belongs to that reference
//! 5. target location exists in the selected warehouse
//! 6. item is not already there
//!
//! Nothing here writes to the store.

use stockmove_core::{ErrorKind, ItemId, RelocationResult};
use tracing::debug;

use crate::context::WarehouseContext;
use crate::gateway::ReconciliationGateway;
use crate::outcome::RowOutcome;
use crate::record::{ItemRecord, LocationRecord, ReferenceRecord};
use crate::row::{InventoryRow, RequiredField, join_fields};

/// Everything resolved for a row that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyRelocation {
    pub item: ItemRecord,
    pub reference: ReferenceRecord,
    pub target: LocationRecord,
}

/// Verdict for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    MissingData { fields: Vec<RequiredField> },
    ItemNotFound,
    ReferenceNotFound,
    ReferenceMismatch,
    LocationNotFound,
    AlreadyCorrect,
    Ready(ReadyRelocation),
}

impl Classification {
    /// Taxonomy class of a failed check; `None` for `AlreadyCorrect` and `Ready`.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Classification::MissingData { .. } => Some(ErrorKind::Input),
            Classification::ItemNotFound
            | Classification::ReferenceNotFound
            | Classification::ReferenceMismatch
            | Classification::LocationNotFound => Some(ErrorKind::Lookup),
            Classification::AlreadyCorrect | Classification::Ready(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Classification::MissingData { .. } => "missing_data",
            Classification::ItemNotFound => "item_not_found",
            Classification::ReferenceNotFound => "reference_not_found",
            Classification::ReferenceMismatch => "reference_mismatch",
            Classification::LocationNotFound => "location_not_found",
            Classification::AlreadyCorrect => "already_correct",
            Classification::Ready(_) => "ready",
        }
    }

    /// The single outcome reported for this row in test mode.
    pub fn outcome(&self, row: &InventoryRow, ctx: &WarehouseContext) -> RowOutcome {
        let n = row.source_row_number;
        let label = row.label();
        match self {
            Classification::MissingData { fields } => RowOutcome::error(
                n,
                ErrorKind::Input,
                format!(
                    "{label}: Missing data for {}. Skipping this row.",
                    join_fields(fields)
                ),
            ),
            Classification::ItemNotFound => RowOutcome::error(
                n,
                ErrorKind::Lookup,
                format!(
                    "{label}: ID {} does not exist or is already processed.",
                    row.id
                ),
            ),
            Classification::ReferenceNotFound => RowOutcome::error(
                n,
                ErrorKind::Lookup,
                format!("{label}: Reference {} does not exist.", row.reference),
            ),
            Classification::ReferenceMismatch => RowOutcome::error(
                n,
                ErrorKind::Lookup,
                format!(
                    "{label}: ID {} does not match with reference {}.",
                    row.id, row.reference
                ),
            ),
            Classification::LocationNotFound => RowOutcome::error(
                n,
                ErrorKind::Lookup,
                format!(
                    "{label}: Location {} does not exist in warehouse {}.",
                    row.actual_location,
                    ctx.warehouse_name()
                ),
            ),
            Classification::AlreadyCorrect => RowOutcome::warning(n, already_correct(row)),
            Classification::Ready(_) => {
                RowOutcome::success(n, format!("{label}: ID {} is ready for processing.", row.id))
            }
        }
    }
}

pub(crate) fn already_correct(row: &InventoryRow) -> String {
    format!(
        "{}: ID {} is already in the correct location {}.",
        row.label(),
        row.id,
        row.actual_location
    )
}

/// Classify `row` against the store. Store failures propagate as errors.
pub async fn classify<G>(
    gateway: &mut G,
    row: &InventoryRow,
    ctx: &WarehouseContext,
) -> RelocationResult<Classification>
where
    G: ReconciliationGateway + ?Sized,
{
    let verdict = classify_inner(gateway, row, ctx).await?;
    debug!(
        row = row.source_row_number,
        item_id = %row.id,
        classification = verdict.name(),
        "row classified"
    );
    Ok(verdict)
}

async fn classify_inner<G>(
    gateway: &mut G,
    row: &InventoryRow,
    ctx: &WarehouseContext,
) -> RelocationResult<Classification>
where
    G: ReconciliationGateway + ?Sized,
{
    let fields = row.blank_fields();
    if !fields.is_empty() {
        return Ok(Classification::MissingData { fields });
    }

    let Some(item) = gateway
        .find_unprocessed_item(&ItemId::new(row.id.as_str()))
        .await?
    else {
        return Ok(Classification::ItemNotFound);
    };

    let Some(reference) = gateway.find_reference(&row.reference).await? else {
        return Ok(Classification::ReferenceNotFound);
    };

    if item.reference_id != reference.reference_id {
        return Ok(Classification::ReferenceMismatch);
    }

    let Some(target) = gateway
        .find_location(ctx.warehouse_name(), &row.actual_location)
        .await?
    else {
        return Ok(Classification::LocationNotFound);
    };

    if item.location_id == target.location_id {
        return Ok(Classification::AlreadyCorrect);
    }

    Ok(Classification::Ready(ReadyRelocation {
        item,
        reference,
        target,
    }))
}
