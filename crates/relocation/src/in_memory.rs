//! In-memory store for tests/dev.
//!
//! Mirrors the SQL gateway's semantics: status-gated reads and writes,
//! affected-row counts, nested units and session commit/rollback. Faults can
//! be injected to exercise the engine's failure paths.

use std::collections::BTreeMap;

use async_trait::async_trait;

use stockmove_core::{ItemId, LocationId, ReferenceId, StoreError, StoreResult};

use crate::gateway::{ReconciliationGateway, UnitOfWork};
use crate::record::{ItemRecord, LocationRecord, MovementRecord, MovementRequest, ReferenceRecord};

/// Failure to inject into an [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFault {
    /// `find_unprocessed_item` fails for this item.
    ItemLookup(ItemId),
    /// Another processor claims the item between read and write:
    /// `update_item_location` sets its status and affects 0 rows.
    UpdateRace(ItemId),
    /// `insert_movement` fails for this item.
    MovementError(ItemId),
    /// `insert_movement` affects 0 rows for this item.
    MovementNotInserted(ItemId),
    /// Opening a row unit fails.
    UnitBegin,
    /// Rolling a row unit back fails; the unit's writes stay in the session.
    UnitRollback,
    /// Session commit fails.
    Commit,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Tables {
    items: BTreeMap<ItemId, ItemRecord>,
    references: Vec<ReferenceRecord>,
    locations: Vec<LocationRecord>,
    movements: Vec<MovementRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    committed: Tables,
    working: Tables,
    units: Vec<Tables>,
    faults: Vec<StoreFault>,
    writes: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, reference_id: i64, code: &str) -> Self {
        self.seed(|t| {
            t.references.push(ReferenceRecord {
                reference_id: ReferenceId::new(reference_id),
                reference: code.to_string(),
            })
        });
        self
    }

    pub fn with_location(mut self, location_id: i64, warehouse: &str, code: &str) -> Self {
        self.seed(|t| {
            t.locations.push(LocationRecord {
                location_id: LocationId::new(location_id),
                warehouse: warehouse.to_string(),
                location: code.to_string(),
            })
        });
        self
    }

    pub fn with_item(mut self, item: ItemRecord) -> Self {
        self.seed(|t| {
            t.items.insert(item.item_id.clone(), item.clone());
        });
        self
    }

    pub fn with_fault(mut self, fault: StoreFault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Current (possibly uncommitted) state of an item, regardless of status.
    pub fn item(&self, item_id: &str) -> Option<&ItemRecord> {
        self.working.items.get(&ItemId::from(item_id))
    }

    /// Movements visible in the session.
    pub fn movements(&self) -> &[MovementRecord] {
        &self.working.movements
    }

    /// Movements made durable by [`UnitOfWork::commit`].
    pub fn committed_movements(&self) -> &[MovementRecord] {
        &self.committed.movements
    }

    /// Number of write operations attempted (updates and inserts).
    pub fn write_attempts(&self) -> usize {
        self.writes
    }

    /// Distinct warehouse names, sorted.
    pub fn warehouses(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .working
            .locations
            .iter()
            .map(|l| l.warehouse.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn seed(&mut self, f: impl Fn(&mut Tables)) {
        f(&mut self.committed);
        f(&mut self.working);
    }

    fn has_fault(&self, fault: &StoreFault) -> bool {
        self.faults.contains(fault)
    }

    fn unprocessed_mut(&mut self, item_id: &ItemId) -> Option<&mut ItemRecord> {
        self.working
            .items
            .get_mut(item_id)
            .filter(|i| i.is_unprocessed())
    }
}

#[async_trait]
impl ReconciliationGateway for InMemoryStore {
    async fn find_unprocessed_item(&mut self, item_id: &ItemId) -> StoreResult<Option<ItemRecord>> {
        if self.has_fault(&StoreFault::ItemLookup(item_id.clone())) {
            return Err(StoreError::Connection("connection reset by peer".into()));
        }
        Ok(self
            .working
            .items
            .get(item_id)
            .filter(|i| i.is_unprocessed())
            .cloned())
    }

    async fn find_reference(&mut self, code: &str) -> StoreResult<Option<ReferenceRecord>> {
        Ok(self
            .working
            .references
            .iter()
            .find(|r| r.reference == code)
            .cloned())
    }

    async fn find_location(
        &mut self,
        warehouse: &str,
        code: &str,
    ) -> StoreResult<Option<LocationRecord>> {
        Ok(self
            .working
            .locations
            .iter()
            .find(|l| l.warehouse == warehouse && l.location == code)
            .cloned())
    }

    async fn update_item_location(
        &mut self,
        item_id: &ItemId,
        location_id: LocationId,
    ) -> StoreResult<u64> {
        self.writes += 1;
        if self.has_fault(&StoreFault::UpdateRace(item_id.clone())) {
            if let Some(item) = self.working.items.get_mut(item_id) {
                item.status = Some("PROCESSED".into());
            }
            return Ok(0);
        }
        match self.unprocessed_mut(item_id) {
            Some(item) => {
                item.location_id = location_id;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_movement(&mut self, request: &MovementRequest) -> StoreResult<u64> {
        self.writes += 1;
        if self.has_fault(&StoreFault::MovementError(request.item_id.clone())) {
            return Err(StoreError::query(
                "insert_movement",
                "constraint failed: movements.destination_location",
            ));
        }
        if self.has_fault(&StoreFault::MovementNotInserted(request.item_id.clone())) {
            return Ok(0);
        }
        let Some(item) = self.unprocessed_mut(&request.item_id) else {
            return Ok(0);
        };
        let movement = MovementRecord::from_item(item, request);
        self.working.movements.push(movement);
        Ok(1)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn begin_unit(&mut self) -> StoreResult<()> {
        if self.has_fault(&StoreFault::UnitBegin) {
            return Err(StoreError::Transaction("cannot open savepoint: disk I/O error".into()));
        }
        self.units.push(self.working.clone());
        Ok(())
    }

    async fn commit_unit(&mut self) -> StoreResult<()> {
        self.units
            .pop()
            .map(|_| ())
            .ok_or_else(|| StoreError::Transaction("no open unit to commit".into()))
    }

    async fn rollback_unit(&mut self) -> StoreResult<()> {
        if self.has_fault(&StoreFault::UnitRollback) {
            return Err(StoreError::Transaction("no such savepoint: row_unit_1".into()));
        }
        let snapshot = self
            .units
            .pop()
            .ok_or_else(|| StoreError::Transaction("no open unit to roll back".into()))?;
        self.working = snapshot;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if self.has_fault(&StoreFault::Commit) {
            return Err(StoreError::Transaction("commit failed: database is locked".into()));
        }
        self.units.clear();
        self.committed = self.working.clone();
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.units.clear();
        self.working = self.committed.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_reference(9, "R1")
            .with_location(1, "MAIN", "L1")
            .with_location(2, "MAIN", "L2")
            .with_location(3, "NORTH", "L2")
            .with_item(ItemRecord {
                item_id: ItemId::new("A1"),
                status: None,
                reference_id: ReferenceId::new(9),
                location_id: LocationId::new(1),
                quantity: 4.0,
                batch: None,
            })
            .with_item(ItemRecord {
                item_id: ItemId::new("DONE"),
                status: Some("SHIPPED".into()),
                reference_id: ReferenceId::new(9),
                location_id: LocationId::new(1),
                quantity: 4.0,
                batch: None,
            })
    }

    #[tokio::test]
    async fn processed_items_are_invisible_and_immutable() {
        let mut store = store();
        let done = ItemId::new("DONE");

        assert!(store.find_unprocessed_item(&done).await.unwrap().is_none());
        assert_eq!(
            store
                .update_item_location(&done, LocationId::new(2))
                .await
                .unwrap(),
            0
        );
        assert_eq!(store.item("DONE").unwrap().location_id, LocationId::new(1));
    }

    #[tokio::test]
    async fn locations_are_scoped_by_warehouse() {
        let mut store = store();
        let loc = store.find_location("NORTH", "L2").await.unwrap().unwrap();
        assert_eq!(loc.location_id, LocationId::new(3));
        assert!(store.find_location("SOUTH", "L2").await.unwrap().is_none());
        assert_eq!(store.warehouses(), vec!["MAIN", "NORTH"]);
    }

    #[tokio::test]
    async fn rolled_back_unit_discards_changes() {
        let mut store = store();
        let a1 = ItemId::new("A1");

        store.begin_unit().await.unwrap();
        store.update_item_location(&a1, LocationId::new(2)).await.unwrap();
        store.rollback_unit().await.unwrap();

        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(1));
        assert!(store.commit_unit().await.is_err());
    }

    #[tokio::test]
    async fn session_rollback_restores_committed_state() {
        let mut store = store();
        let request = MovementRequest {
            item_id: ItemId::new("A1"),
            source_warehouse: "MAIN".into(),
            source_location: "L1".into(),
            destination_warehouse: "MAIN".into(),
            destination_location: "L2".into(),
            user: "jdoe".into(),
            occurred_at: Utc::now(),
        };

        assert_eq!(store.insert_movement(&request).await.unwrap(), 1);
        assert_eq!(store.movements().len(), 1);
        store.rollback().await.unwrap();

        assert!(store.movements().is_empty());
        assert!(store.committed_movements().is_empty());
    }
}
