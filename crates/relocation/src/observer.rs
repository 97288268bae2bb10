//! Hooks the batch runner calls between rows.
//!
//! Observers are invoked synchronously on the runner's task, so they must
//! return quickly. [`ChannelObserver`] hands events to another task over an
//! unbounded channel and never blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::outcome::{Progress, RowOutcome};

pub trait BatchObserver: Send {
    /// Called after every row, whatever its outcome.
    fn on_progress(&mut self, _progress: Progress) {}

    /// Called once per outcome, in order.
    fn on_outcome(&mut self, _outcome: &RowOutcome) {}

    /// Polled before each row; returning `false` stops the batch there.
    fn should_continue(&self) -> bool {
        true
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Progress(Progress),
    Outcome(RowOutcome),
}

/// Forwards runner events to a receiver owned by the presentation layer.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<BatchEvent>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, cancel: None }, rx)
    }

    /// Stop the batch before the next row once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }
}

impl BatchObserver for ChannelObserver {
    fn on_progress(&mut self, progress: Progress) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.tx.send(BatchEvent::Progress(progress));
    }

    fn on_outcome(&mut self, outcome: &RowOutcome) {
        let _ = self.tx.send(BatchEvent::Outcome(outcome.clone()));
    }

    fn should_continue(&self) -> bool {
        self.cancel
            .as_ref()
            .is_none_or(|flag| !flag.load(Ordering::Relaxed))
    }
}
