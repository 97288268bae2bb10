//! `stockmove-core`: shared building blocks for the relocation engine.
//!
//! This crate contains **pure** primitives (no IO): the error taxonomy and
//! the strongly-typed identifiers used by the store records.

pub mod error;
pub mod id;

pub use error::{ErrorKind, RelocationError, RelocationResult, StoreError, StoreResult};
pub use id::{BatchId, ItemId, LocationId, ReferenceId};
