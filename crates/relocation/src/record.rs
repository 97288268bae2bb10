//! Store-resident records as seen by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockmove_core::{ItemId, LocationId, ReferenceId};

/// `movement_type` written for every relocation.
pub const RELOCATION: &str = "RELOCATION";

/// `notes` written for every relocation.
pub const MOVEMENT_NOTES: &str = "location_update_script";

/// A tracked item. Only rows with `status IS NULL` are ever returned to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    pub status: Option<String>,
    pub reference_id: ReferenceId,
    pub location_id: LocationId,
    pub quantity: f64,
    pub batch: Option<String>,
}

impl ItemRecord {
    pub fn is_unprocessed(&self) -> bool {
        self.status.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub reference_id: ReferenceId,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub location_id: LocationId,
    pub warehouse: String,
    pub location: String,
}

/// What the applier asks the gateway to record.
///
/// Quantity and batch are deliberately absent: the gateway copies them from
/// the item row as it stands at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementRequest {
    pub item_id: ItemId,
    pub source_warehouse: String,
    pub source_location: String,
    pub destination_warehouse: String,
    pub destination_location: String,
    pub user: String,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only audit entry, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub movement_type: String,
    pub reference_id: ReferenceId,
    pub item_id: ItemId,
    pub quantity: f64,
    pub units: f64,
    pub source_warehouse: String,
    pub source_location: String,
    pub destination_warehouse: String,
    pub destination_location: String,
    pub date: DateTime<Utc>,
    pub user: String,
    pub notes: String,
    pub cancelled: bool,
    pub batch: Option<String>,
}

impl MovementRecord {
    /// Build the stored movement for `request` from the item's current row.
    pub fn from_item(item: &ItemRecord, request: &MovementRequest) -> Self {
        Self {
            movement_type: RELOCATION.to_string(),
            reference_id: item.reference_id,
            item_id: item.item_id.clone(),
            quantity: item.quantity,
            units: units_for(item.quantity),
            source_warehouse: request.source_warehouse.clone(),
            source_location: request.source_location.clone(),
            destination_warehouse: request.destination_warehouse.clone(),
            destination_location: request.destination_location.clone(),
            date: request.occurred_at,
            user: request.user.clone(),
            notes: MOVEMENT_NOTES.to_string(),
            cancelled: false,
            batch: item.batch.clone(),
        }
    }
}

/// Unit multiplier recorded alongside a movement's quantity.
pub fn units_for(quantity: f64) -> f64 {
    if quantity > 0.0 { 1.0 } else { 0.0 }
}
