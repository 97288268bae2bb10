//! Outcome reporter: ordered outcomes for display.

use std::collections::HashMap;

use serde::Serialize;

use crate::observer::BatchObserver;
use crate::outcome::{Progress, RowOutcome, Severity};

/// Accumulates outcomes in the order the runner produced them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeReport {
    outcomes: Vec<RowOutcome>,
    last_progress: Option<Progress>,
}

impl OutcomeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[RowOutcome] {
        &self.outcomes
    }

    /// `(severity, message)` pairs, ready for any presentation layer.
    pub fn lines(&self) -> impl Iterator<Item = (Severity, &str)> + '_ {
        self.outcomes.iter().map(|o| (o.severity, o.message.as_str()))
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.outcomes.iter().filter(|o| o.severity == severity).count()
    }

    pub fn counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for o in &self.outcomes {
            *counts.entry(o.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(RowOutcome::is_error)
    }

    pub fn last_progress(&self) -> Option<Progress> {
        self.last_progress
    }
}

impl BatchObserver for OutcomeReport {
    fn on_progress(&mut self, progress: Progress) {
        self.last_progress = Some(progress);
    }

    fn on_outcome(&mut self, outcome: &RowOutcome) {
        self.record(outcome.clone());
    }
}

impl core::fmt::Display for OutcomeReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (severity, message) in self.lines() {
            writeln!(f, "[{}] {}", severity.as_str(), message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockmove_core::ErrorKind;

    fn report() -> OutcomeReport {
        let mut report = OutcomeReport::new();
        report.on_outcome(&RowOutcome::success(2, "Row 2: ID A1 is ready for processing."));
        report.on_outcome(&RowOutcome::error(
            3,
            ErrorKind::Lookup,
            "Row 3: Reference R9 does not exist.",
        ));
        report.on_outcome(&RowOutcome::warning(
            4,
            "Row 4: ID A3 is already in the correct location L2.",
        ));
        report
    }

    #[test]
    fn keeps_order_and_counts_by_severity() {
        let report = report();

        let severities: Vec<_> = report.lines().map(|(s, _)| s).collect();
        assert_eq!(
            severities,
            vec![Severity::Success, Severity::Error, Severity::Warning]
        );
        assert_eq!(report.count(Severity::Error), 1);
        assert_eq!(report.counts().get(&Severity::Success), Some(&1));
        assert!(report.has_errors());
    }

    #[test]
    fn renders_one_line_per_outcome() {
        let text = report().to_string();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("[success] Row 2:"));
        assert!(text.contains("[error] Row 3: Reference R9 does not exist."));
    }
}
