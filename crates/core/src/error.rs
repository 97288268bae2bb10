//! Relocation error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the relocation engine.
pub type RelocationResult<T> = Result<T, RelocationError>;

/// Result type returned by store gateway implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Taxonomy class of a failure.
///
/// `Input`, `Lookup` and `Conflict` are per-row and never fatal to a batch;
/// lookups and conflicts are verdicts carried on outcomes, not errors.
/// `Store` and `Internal` are fatal only when raised outside a row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Lookup,
    Conflict,
    Store,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::Lookup => "lookup",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Store => "store",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Relocation-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelocationError {
    /// Missing or malformed input (columns, row fields, context).
    #[error("{0}")]
    Input(String),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else that should never happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelocationError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelocationError::Input(_) => ErrorKind::Input,
            RelocationError::Store(_) => ErrorKind::Store,
            RelocationError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Store-level error (connection, query or transaction failure).
///
/// These are **infrastructure errors**; "not found" is never an error at
/// this level, gateways return `Option` for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query `{operation}` failed: {message}")]
    Query { operation: String, message: String },

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl StoreError {
    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert_into_store_kind() {
        let err: RelocationError = StoreError::Connection("refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.to_string(), "connection error: refused");
    }

    #[test]
    fn input_error_displays_message_verbatim() {
        let err = RelocationError::input("Missing columns: ID, Location");
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(err.to_string(), "Missing columns: ID, Location");
    }

    #[test]
    fn query_error_names_operation() {
        let err = StoreError::query("find_reference", "no such table: references");
        assert_eq!(
            err.to_string(),
            "query `find_reference` failed: no such table: references"
        );
    }
}
