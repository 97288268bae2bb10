//! Batch runner: drives rows through the validator (and the applier).
//!
//! ## Guarantees
//!
//! - Rows are handled strictly in input order, one at a time. Relocation is a
//!   read-then-conditional-write against shared state; interleaving rows
//!   could hide a lost race.
//! - Every row gets exactly one outcome. A row whose lookups or writes fail is
//!   reported as an error and the batch moves on.
//! - In process mode each row is its own unit of work inside the session, so a
//!   failed row leaves no partial writes behind. The session is committed once
//!   at the end.
//! - A failure outside any row (unit boundaries, final commit) rolls back the
//!   whole session and appends one summary error without a row number. Rows
//!   not yet reached are reported as skipped.
//! - Progress reaches `total` on every run, including cancelled and aborted
//!   ones.

use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};

use stockmove_core::{BatchId, ErrorKind, RelocationError, RelocationResult};

use crate::applier::apply;
use crate::context::WarehouseContext;
use crate::gateway::UnitOfWork;
use crate::observer::BatchObserver;
use crate::outcome::{Progress, RowOutcome, RunMode, Severity};
use crate::row::InventoryRow;
use crate::validator::{Classification, classify};

/// Result of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub mode: RunMode,
    pub total_rows: usize,
    pub outcomes: Vec<RowOutcome>,
    /// Process mode only: whether the session's writes were made durable.
    pub committed: bool,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn count(&self, severity: Severity) -> usize {
        self.outcomes.iter().filter(|o| o.severity == severity).count()
    }

    /// The batch-level failure, if the run was aborted.
    pub fn failure(&self) -> Option<&RowOutcome> {
        self.outcomes.iter().find(|o| o.source_row_number.is_none())
    }
}

/// Sequential runner for one batch.
#[derive(Debug, Copy, Clone)]
pub struct BatchRunner {
    mode: RunMode,
}

impl BatchRunner {
    pub fn new(mode: RunMode) -> Self {
        Self { mode }
    }

    pub fn test() -> Self {
        Self::new(RunMode::Test)
    }

    pub fn process() -> Self {
        Self::new(RunMode::Process)
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Run `rows` against an exclusively owned store session.
    pub async fn run<S, O>(
        &self,
        store: &mut S,
        rows: &[InventoryRow],
        ctx: &WarehouseContext,
        observer: &mut O,
    ) -> BatchSummary
    where
        S: UnitOfWork + ?Sized,
        O: BatchObserver + ?Sized,
    {
        let batch_id = BatchId::new();
        let span = info_span!(
            "relocation_batch",
            %batch_id,
            mode = self.mode.as_str(),
            warehouse = ctx.warehouse_name(),
            user = ctx.acting_user(),
            total_rows = rows.len(),
        );

        self.run_inner(batch_id, store, rows, ctx, observer)
            .instrument(span)
            .await
    }

    async fn run_inner<S, O>(
        &self,
        batch_id: BatchId,
        store: &mut S,
        rows: &[InventoryRow],
        ctx: &WarehouseContext,
        observer: &mut O,
    ) -> BatchSummary
    where
        S: UnitOfWork + ?Sized,
        O: BatchObserver + ?Sized,
    {
        let total = rows.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;
        let mut aborted: Option<RelocationError> = None;

        info!("batch started");

        for (idx, row) in rows.iter().enumerate() {
            if !observer.should_continue() {
                cancelled = true;
                warn!(remaining = total - idx, "batch cancelled");
                self.skip_rest(observer, &mut outcomes, rows, idx, |skipped| {
                    RowOutcome::warning(
                        skipped.source_row_number,
                        format!("{}: Skipped, batch was cancelled.", skipped.label()),
                    )
                });
                break;
            }

            let outcome = match self.mode {
                RunMode::Test => Ok(self.test_row(store, row, ctx).await),
                RunMode::Process => self.process_row(store, row, ctx).await,
            };

            match outcome {
                Ok(outcome) => emit(observer, &mut outcomes, outcome),
                Err((outcome, err)) => {
                    emit(observer, &mut outcomes, outcome);
                    aborted = Some(err);
                }
            }

            self.progress(observer, idx + 1, total);

            if let Some(err) = &aborted {
                error!(error = %err, remaining = total - idx - 1, "batch aborted");
                let kind = err.kind();
                self.skip_rest(observer, &mut outcomes, rows, idx + 1, |skipped| {
                    RowOutcome::error(
                        skipped.source_row_number,
                        kind,
                        format!("{}: Skipped, batch was aborted.", skipped.label()),
                    )
                });
                break;
            }
        }

        let committed = match self.finish(store, aborted).await {
            Ok(committed) => committed,
            Err(err) => {
                error!(error = %err, "batch rolled back");
                let outcome =
                    RowOutcome::batch_error(err.kind(), format!("Error processing data: {err}"));
                emit(observer, &mut outcomes, outcome);
                false
            }
        };

        info!(
            committed,
            cancelled,
            errors = outcomes.iter().filter(|o| o.is_error()).count(),
            "batch finished"
        );

        BatchSummary {
            batch_id,
            mode: self.mode,
            total_rows: total,
            outcomes,
            committed,
            cancelled,
        }
    }

    /// Report every row from `from` on without touching the store.
    fn skip_rest<O>(
        &self,
        observer: &mut O,
        outcomes: &mut Vec<RowOutcome>,
        rows: &[InventoryRow],
        from: usize,
        skipped: impl Fn(&InventoryRow) -> RowOutcome,
    ) where
        O: BatchObserver + ?Sized,
    {
        for (idx, row) in rows.iter().enumerate().skip(from) {
            emit(observer, outcomes, skipped(row));
            self.progress(observer, idx + 1, rows.len());
        }
    }

    fn progress<O>(&self, observer: &mut O, current: usize, total: usize)
    where
        O: BatchObserver + ?Sized,
    {
        observer.on_progress(Progress {
            current,
            total,
            mode: self.mode,
        });
    }

    async fn test_row<S>(&self, store: &mut S, row: &InventoryRow, ctx: &WarehouseContext) -> RowOutcome
    where
        S: UnitOfWork + ?Sized,
    {
        match classify(store, row, ctx).await {
            Ok(verdict) => verdict.outcome(row, ctx),
            Err(err) => fault_outcome(row, &err),
        }
    }

    /// `Err` carries the row's own outcome plus the error that aborts the batch.
    async fn process_row<S>(
        &self,
        store: &mut S,
        row: &InventoryRow,
        ctx: &WarehouseContext,
    ) -> Result<RowOutcome, (RowOutcome, RelocationError)>
    where
        S: UnitOfWork + ?Sized,
    {
        if let Err(err) = store.begin_unit().await {
            let err = RelocationError::from(err);
            return Err((fault_outcome(row, &err), err));
        }

        let (outcome, keep) = match self.attempt(store, row, ctx).await {
            Ok(result) => result,
            Err(err) => (fault_outcome(row, &err), false),
        };

        let boundary = if keep {
            store.commit_unit().await
        } else {
            store.rollback_unit().await
        };

        match boundary {
            Ok(()) => Ok(outcome),
            Err(err) => {
                let err = RelocationError::from(err);
                error!(row = row.source_row_number, error = %err, "row unit boundary failed");
                // A row that already failed keeps its own cause.
                let outcome = if outcome.is_error() {
                    outcome
                } else {
                    fault_outcome(row, &err)
                };
                Err((outcome, err))
            }
        }
    }

    async fn attempt<S>(
        &self,
        store: &mut S,
        row: &InventoryRow,
        ctx: &WarehouseContext,
    ) -> RelocationResult<(RowOutcome, bool)>
    where
        S: UnitOfWork + ?Sized,
    {
        match classify(store, row, ctx).await? {
            Classification::Ready(ready) => {
                let applied = apply(store, row, &ready, ctx).await?;
                Ok((applied.outcome(row, ctx), applied.keeps_changes()))
            }
            other => Ok((other.outcome(row, ctx), true)),
        }
    }

    /// Commit (process mode) or release (test mode) the session.
    ///
    /// Returns whether writes were committed.
    async fn finish<S>(&self, store: &mut S, aborted: Option<RelocationError>) -> RelocationResult<bool>
    where
        S: UnitOfWork + ?Sized,
    {
        if let Some(err) = aborted {
            if let Err(rollback) = store.rollback().await {
                error!(error = %rollback, "rollback after abort failed");
            }
            return Err(err);
        }

        match self.mode {
            RunMode::Test => {
                store.rollback().await?;
                Ok(false)
            }
            RunMode::Process => {
                if let Err(err) = store.commit().await {
                    if let Err(rollback) = store.rollback().await {
                        error!(error = %rollback, "rollback after failed commit failed");
                    }
                    return Err(err.into());
                }
                Ok(true)
            }
        }
    }
}

fn fault_outcome(row: &InventoryRow, err: &RelocationError) -> RowOutcome {
    error!(
        row = row.source_row_number,
        item_id = %row.id,
        error = %err,
        "row failed"
    );
    let kind = match err.kind() {
        ErrorKind::Store => ErrorKind::Store,
        _ => ErrorKind::Internal,
    };
    RowOutcome::error(
        row.source_row_number,
        kind,
        format!("{}: Error processing ID {}: {err}", row.label(), row.id),
    )
}

fn emit<O>(observer: &mut O, outcomes: &mut Vec<RowOutcome>, outcome: RowOutcome)
where
    O: BatchObserver + ?Sized,
{
    match outcome.severity {
        Severity::Error => warn!(row = outcome.source_row_number, "{}", outcome.message),
        Severity::Warning => info!(row = outcome.source_row_number, "{}", outcome.message),
        Severity::Success => debug!(row = outcome.source_row_number, "{}", outcome.message),
    }
    observer.on_outcome(&outcome);
    outcomes.push(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{InMemoryStore, StoreFault};
    use crate::observer::NoopObserver;
    use crate::record::ItemRecord;
    use crate::report::OutcomeReport;
    use proptest::prelude::*;
    use stockmove_core::{ItemId, LocationId, ReferenceId};

    fn ctx() -> WarehouseContext {
        WarehouseContext::new("MAIN", "jdoe").unwrap()
    }

    fn item(id: &str, location_id: i64) -> ItemRecord {
        ItemRecord {
            item_id: ItemId::new(id),
            status: None,
            reference_id: ReferenceId::new(9),
            location_id: LocationId::new(location_id),
            quantity: 2.0,
            batch: None,
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_reference(9, "R1")
            .with_location(1, "MAIN", "L1")
            .with_location(2, "MAIN", "L2")
            .with_item(item("A1", 1))
            .with_item(item("A2", 1))
            .with_item(item("A3", 2))
    }

    fn rows() -> Vec<InventoryRow> {
        vec![
            InventoryRow::new(2, "A1", "R1", "L2", "L1"),
            InventoryRow::new(3, "A2", "R9", "L2", "L1"),
            InventoryRow::new(4, "A3", "R1", "L2", "L1"),
            InventoryRow::new(5, "A2", "R1", "L2", "L1"),
        ]
    }

    fn severities(summary: &BatchSummary) -> Vec<Severity> {
        summary.outcomes.iter().map(|o| o.severity).collect()
    }

    #[tokio::test]
    async fn test_mode_classifies_without_writing() {
        let mut store = store();
        let mut report = OutcomeReport::new();

        let summary = BatchRunner::test()
            .run(&mut store, &rows(), &ctx(), &mut report)
            .await;

        assert_eq!(
            severities(&summary),
            vec![Severity::Success, Severity::Error, Severity::Warning, Severity::Success]
        );
        assert_eq!(summary.outcomes[0].message, "Row 2: ID A1 is ready for processing.");
        assert!(!summary.committed);
        assert_eq!(store.write_attempts(), 0);
        assert_eq!(report.outcomes(), summary.outcomes.as_slice());
        assert_eq!(report.last_progress().map(|p| p.percent()), Some(100));
    }

    #[tokio::test]
    async fn process_mode_relocates_ready_rows_and_commits_once() {
        let mut store = store();

        let summary = BatchRunner::process()
            .run(&mut store, &rows(), &ctx(), &mut NoopObserver)
            .await;

        assert_eq!(
            severities(&summary),
            vec![Severity::Success, Severity::Error, Severity::Warning, Severity::Success]
        );
        assert!(summary.committed);
        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(2));
        assert_eq!(store.item("A2").unwrap().location_id, LocationId::new(2));
        assert_eq!(store.committed_movements().len(), 2);
    }

    #[tokio::test]
    async fn second_process_pass_is_already_correct() {
        let mut store = store();
        let batch = vec![
            InventoryRow::new(2, "A1", "R1", "L2", "L1"),
            InventoryRow::new(3, "A2", "R1", "L2", "L1"),
        ];

        let first = BatchRunner::process()
            .run(&mut store, &batch, &ctx(), &mut NoopObserver)
            .await;
        let second = BatchRunner::process()
            .run(&mut store, &batch, &ctx(), &mut NoopObserver)
            .await;

        assert_eq!(first.count(Severity::Success), 2);
        assert_eq!(second.count(Severity::Warning), 2);
        assert_eq!(store.committed_movements().len(), 2);
    }

    #[tokio::test]
    async fn faulty_row_does_not_stop_the_batch() {
        let mut store = store().with_fault(StoreFault::MovementError(ItemId::new("A1")));

        let summary = BatchRunner::process()
            .run(&mut store, &rows(), &ctx(), &mut NoopObserver)
            .await;

        assert_eq!(summary.outcomes.len(), 4);
        let first = &summary.outcomes[0];
        assert_eq!(first.kind, Some(ErrorKind::Store));
        assert!(first.message.starts_with("Row 2: Error processing ID A1:"));
        // A1's location update was rolled back with its unit.
        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(1));
        assert_eq!(store.item("A2").unwrap().location_id, LocationId::new(2));
        assert!(summary.committed);
    }

    #[tokio::test]
    async fn unrecorded_movement_rolls_back_the_update() {
        let mut store = store().with_fault(StoreFault::MovementNotInserted(ItemId::new("A1")));
        let batch = vec![InventoryRow::new(2, "A1", "R1", "L2", "L1")];

        let summary = BatchRunner::process()
            .run(&mut store, &batch, &ctx(), &mut NoopObserver)
            .await;

        assert_eq!(summary.outcomes[0].kind, Some(ErrorKind::Conflict));
        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(1));
        assert!(store.committed_movements().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_rolls_back_everything() {
        let mut store = store().with_fault(StoreFault::Commit);

        let summary = BatchRunner::process()
            .run(&mut store, &rows(), &ctx(), &mut NoopObserver)
            .await;

        assert!(!summary.committed);
        assert_eq!(summary.outcomes.len(), rows().len() + 1);
        let failure = summary.failure().unwrap();
        assert_eq!(failure.kind, Some(ErrorKind::Store));
        assert!(failure.message.starts_with("Error processing data: "));
        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(1));
        assert!(store.movements().is_empty());
    }

    #[tokio::test]
    async fn failed_unit_rollback_aborts_and_skips_the_rest() {
        let mut store = store()
            .with_fault(StoreFault::ItemLookup(ItemId::new("A1")))
            .with_fault(StoreFault::UnitRollback);
        let mut report = OutcomeReport::new();

        let summary = BatchRunner::process()
            .run(&mut store, &rows(), &ctx(), &mut report)
            .await;

        assert!(!summary.committed);
        let per_row: Vec<_> = summary
            .outcomes
            .iter()
            .filter(|o| o.source_row_number.is_some())
            .collect();
        assert_eq!(per_row.len(), rows().len());
        // The failing row keeps its own cause, not the savepoint error.
        assert_eq!(
            per_row[0].message,
            "Row 2: Error processing ID A1: connection error: connection reset by peer"
        );
        assert_eq!(per_row[1].message, "Row 3: Skipped, batch was aborted.");
        assert!(per_row.iter().all(|o| o.is_error()));

        let summaries: Vec<_> = summary
            .outcomes
            .iter()
            .filter(|o| o.source_row_number.is_none())
            .collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].message,
            "Error processing data: transaction error: no such savepoint: row_unit_1"
        );
        assert_eq!(summary.outcomes.last(), summary.failure());

        assert_eq!(store.write_attempts(), 0);
        assert!(store.movements().is_empty());
        assert_eq!(report.last_progress().map(|p| p.percent()), Some(100));
    }

    #[tokio::test]
    async fn failed_unit_begin_rolls_back_the_session() {
        let mut store = store().with_fault(StoreFault::UnitBegin);

        let summary = BatchRunner::process()
            .run(&mut store, &rows(), &ctx(), &mut NoopObserver)
            .await;

        assert!(!summary.committed);
        assert_eq!(summary.outcomes.len(), rows().len() + 1);
        assert!(
            summary.outcomes[0]
                .message
                .ends_with("transaction error: cannot open savepoint: disk I/O error")
        );
        assert_eq!(summary.outcomes[3].message, "Row 5: Skipped, batch was aborted.");
        assert_eq!(summary.failure().and_then(|f| f.kind), Some(ErrorKind::Store));
        assert_eq!(store.item("A1").unwrap().location_id, LocationId::new(1));
        assert!(store.committed_movements().is_empty());
    }

    struct StopAfter {
        seen: usize,
        limit: usize,
        last: Option<Progress>,
    }

    impl BatchObserver for StopAfter {
        fn on_progress(&mut self, progress: Progress) {
            self.seen += 1;
            self.last = Some(progress);
        }

        fn should_continue(&self) -> bool {
            self.seen < self.limit
        }
    }

    #[tokio::test]
    async fn cancellation_between_rows_skips_the_rest() {
        let mut store = store();
        let mut observer = StopAfter {
            seen: 0,
            limit: 1,
            last: None,
        };

        let summary = BatchRunner::process()
            .run(&mut store, &rows(), &ctx(), &mut observer)
            .await;

        assert!(summary.cancelled);
        assert_eq!(summary.outcomes.len(), 4);
        assert_eq!(summary.outcomes[1].message, "Row 3: Skipped, batch was cancelled.");
        assert!(summary.committed);
        assert_eq!(store.committed_movements().len(), 1);
        // Skipped rows still advance progress to the end.
        assert_eq!(observer.seen, 4);
        assert_eq!(observer.last.map(|p| p.percent()), Some(100));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: whatever rows fail, every input row yields exactly one
        /// outcome and outcomes keep input order.
        #[test]
        fn one_outcome_per_row(
            picks in prop::collection::vec((0usize..5, 0usize..3, any::<bool>()), 0..20),
            faulty in 0usize..5,
        ) {
            let ids = ["A1", "A2", "A3", "ZZ", ""];
            let refs = ["R1", "R9", ""];
            let batch: Vec<InventoryRow> = picks
                .iter()
                .zip(2u32..)
                .map(|(&(i, r, to_l2), n)| {
                    let target = if to_l2 { "L2" } else { "L1" };
                    InventoryRow::new(n, ids[i], refs[r], target, "L1")
                })
                .collect();

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let mut store = store().with_fault(StoreFault::ItemLookup(ItemId::new(ids[faulty])));
            let summary = rt.block_on(
                BatchRunner::process().run(&mut store, &batch, &ctx(), &mut NoopObserver),
            );

            prop_assert_eq!(summary.outcomes.len(), batch.len());
            let numbers: Vec<_> = summary.outcomes.iter().map(|o| o.source_row_number).collect();
            let expected: Vec<_> = batch.iter().map(|r| Some(r.source_row_number)).collect();
            prop_assert_eq!(numbers, expected);
        }
    }
}
