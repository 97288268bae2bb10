use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span};

use stockmove_core::{RelocationError, RelocationResult};
use stockmove_relocation::{
    BatchEvent, BatchObserver, BatchRunner, BatchSummary, ChannelObserver, InventoryRow,
    RowOutcome, RunMode, WarehouseContext,
};

use crate::sqlite::SqliteStore;

/// Handle to observe, cancel and join a batch running in the background.
#[derive(Debug)]
pub struct BatchHandle {
    /// Progress and outcome events, in the order the runner produced them.
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    cancel: Arc<AtomicBool>,
    join: JoinHandle<RelocationResult<BatchSummary>>,
}

impl BatchHandle {
    /// Ask the runner to stop before its next row.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for the run to finish.
    ///
    /// Fails only when no session could be opened or the task itself died;
    /// row and commit failures are reported inside the summary.
    pub async fn wait(self) -> RelocationResult<BatchSummary> {
        self.join
            .await
            .map_err(|e| RelocationError::internal(format!("batch task failed: {e}")))?
    }
}

/// Run a batch on a tokio task so the caller stays free to render progress.
///
/// The task opens its own session; concurrent batches therefore never share
/// a transaction.
pub fn spawn_batch(
    store: SqliteStore,
    rows: Vec<InventoryRow>,
    ctx: WarehouseContext,
    mode: RunMode,
) -> BatchHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (observer, events) = ChannelObserver::new();
    let mut observer = observer.with_cancel_flag(cancel.clone());
    let span = info_span!("batch_worker", mode = mode.as_str(), rows = rows.len());

    let join = tokio::spawn(
        async move {
            let mut session = match store.begin_session().await {
                Ok(session) => session,
                Err(err) => {
                    error!(error = %err, "could not open store session");
                    let err = RelocationError::from(err);
                    observer.on_outcome(&RowOutcome::batch_error(
                        err.kind(),
                        format!("Error processing data: {err}"),
                    ));
                    return Err(err);
                }
            };

            let summary = BatchRunner::new(mode)
                .run(&mut session, &rows, &ctx, &mut observer)
                .await;
            Ok(summary)
        }
        .instrument(span),
    );

    BatchHandle {
        events,
        cancel,
        join,
    }
}
