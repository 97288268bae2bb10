//! Warehouse relocation engine.
//!
//! Validates spreadsheet rows that claim an item now lives somewhere else and,
//! in process mode, moves the item and writes an audit movement for it.
//!
//! ## Flow
//!
//! ```text
//! InputTable ──into_rows──▶ [InventoryRow] ──BatchRunner──▶ [RowOutcome]
//!                                               │
//!                                 classify ─────┤ (read-only lookups)
//!                                 apply ────────┘ (Process mode, Ready rows)
//! ```
//!
//! Storage is reached only through [`ReconciliationGateway`] /
//! [`UnitOfWork`]; the SQL implementation lives in `stockmove-infra`,
//! [`InMemoryStore`] backs tests.

pub mod applier;
pub mod context;
pub mod gateway;
pub mod in_memory;
pub mod observer;
pub mod outcome;
pub mod record;
pub mod report;
pub mod row;
pub mod runner;
pub mod validator;

pub use applier::{Application, apply};
pub use context::WarehouseContext;
pub use gateway::{ReconciliationGateway, UnitOfWork};
pub use in_memory::{InMemoryStore, StoreFault};
pub use observer::{BatchEvent, BatchObserver, ChannelObserver, NoopObserver};
pub use outcome::{Progress, RowOutcome, RunMode, Severity};
pub use record::{
    ItemRecord, LocationRecord, MOVEMENT_NOTES, MovementRecord, MovementRequest, RELOCATION,
    ReferenceRecord, units_for,
};
pub use report::OutcomeReport;
pub use row::{InputTable, InventoryRow, RequiredField, number_rows};
pub use runner::{BatchRunner, BatchSummary};
pub use validator::{Classification, ReadyRelocation, classify};
