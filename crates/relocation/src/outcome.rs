//! Per-row outcomes and progress signals.

use serde::{Deserialize, Serialize};

use stockmove_core::ErrorKind;

/// How a batch treats `Ready` rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Dry run: classify only, never write.
    Test,
    /// Classify, then relocate `Ready` rows.
    Process,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Test => "test",
            RunMode::Process => "process",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Success,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Success => "success",
        }
    }
}

/// Result of one row (or, without a row number, of the batch itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    /// `None` only for the batch-level summary error.
    pub source_row_number: Option<u32>,
    pub severity: Severity,
    /// Taxonomy class for error outcomes.
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl RowOutcome {
    pub fn success(row: u32, message: impl Into<String>) -> Self {
        Self {
            source_row_number: Some(row),
            severity: Severity::Success,
            kind: None,
            message: message.into(),
        }
    }

    pub fn warning(row: u32, message: impl Into<String>) -> Self {
        Self {
            source_row_number: Some(row),
            severity: Severity::Warning,
            kind: None,
            message: message.into(),
        }
    }

    pub fn error(row: u32, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            source_row_number: Some(row),
            severity: Severity::Error,
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn batch_error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            source_row_number: None,
            severity: Severity::Error,
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// `(current, total)` after a row has been handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub mode: RunMode,
}

impl Progress {
    /// `floor(current / total * 100)`; an empty batch reports 0.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = self.current.min(self.total) * 100 / self.total;
        pct as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn percent_floors() {
        let p = Progress {
            current: 1,
            total: 3,
            mode: RunMode::Test,
        };
        assert_eq!(p.percent(), 33);
    }

    #[test]
    fn empty_batch_is_zero_percent() {
        let p = Progress {
            current: 0,
            total: 0,
            mode: RunMode::Process,
        };
        assert_eq!(p.percent(), 0);
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    proptest! {
        #[test]
        fn percent_stays_within_bounds(total in 1usize..10_000, seed in 0usize..10_000) {
            let current = seed % (total + 1);
            let p = Progress { current, total, mode: RunMode::Test };
            prop_assert!(p.percent() <= 100);
            prop_assert_eq!(p.percent() == 100, current == total);
        }
    }
}
