//! Sequential batch queue runner
//!
//! Drives an ordered list of [`QueuedItem`]s through an [`ItemProcessor`] one
//! at a time. Both pipeline stages use this runner; they differ only in the
//! processor and the pause between items.
//!
//! Guarantees:
//! - items reach a terminal state in submission order, never concurrently;
//! - a failing item is recorded and the next item is still attempted;
//! - cancellation is checked before each item starts (and while pausing
//!   between items). An item already in flight is allowed to finish, but
//!   its processor receives a child token it may honor to abort early.

use crate::{
    error::{BatchError, Result},
    services::{NoOpObserver, QueueObserver},
    tracing_config::spans,
    types::{DataUri, ImageSource, QueuedItem, StatusKind},
};
use async_trait::async_trait;
use futures::Stream;
use instant::Instant;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

/// One unit of work applied to each queued image
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Batch-level checks run once before any item starts
    ///
    /// # Errors
    /// - Missing configuration that makes every item fail (e.g. no credential)
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Process one image and return a reference to the result
    ///
    /// # Errors
    /// Any error is recorded on the item; the batch continues.
    async fn process(&self, source: &ImageSource, cancel: &CancellationToken) -> Result<DataUri>;
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item was attempted
    Completed,
    /// Stopped early; untouched items remain queued
    Cancelled,
}

/// Lifecycle of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => Self::Completed,
            RunOutcome::Cancelled => Self::Cancelled,
        }
    }
}

/// Final per-item statuses of a run
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub items: Vec<QueuedItem>,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
}

impl BatchReport {
    #[must_use]
    pub fn statuses(&self) -> Vec<StatusKind> {
        self.items.iter().map(QueuedItem::kind).collect()
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.count(StatusKind::Completed)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(StatusKind::Error)
    }

    /// Items that never started (only non-zero after cancellation)
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.count(StatusKind::Queued)
    }

    /// Items that completed successfully, in submission order
    #[must_use]
    pub fn completed_items(&self) -> Vec<&QueuedItem> {
        self.items
            .iter()
            .filter(|item| item.kind() == StatusKind::Completed)
            .collect()
    }

    /// Whether the run finished and every single item succeeded
    #[must_use]
    pub fn is_fully_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.completed_count() == self.items.len()
    }

    fn count(&self, kind: StatusKind) -> usize {
        self.items.iter().filter(|item| item.kind() == kind).count()
    }
}

/// In-flight state of a single run
struct BatchRun<'a> {
    items: Vec<QueuedItem>,
    /// Index of the last item started; -1 before the first
    current_index: isize,
    cancel: CancellationToken,
    outcome: Option<RunOutcome>,
    /// The most recent item was aborted by cancellation mid-call
    last_aborted: bool,
    started_at: Instant,
    _guard: ActiveGuard<'a>,
}

impl BatchRun<'_> {
    fn next_index(&self) -> usize {
        (self.current_index + 1) as usize
    }

    fn into_report(self) -> BatchReport {
        BatchReport {
            outcome: self.outcome.unwrap_or(RunOutcome::Cancelled),
            elapsed: self.started_at.elapsed(),
            items: self.items,
        }
    }
}

/// Releases the runner when a run ends or its stream is dropped
struct ActiveGuard<'a> {
    active: &'a AtomicBool,
    state: &'a Mutex<RunState>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if *state == RunState::Running {
                *state = RunState::Cancelled;
            }
        }
        self.active.store(false, Ordering::Release);
    }
}

/// Sequential runner over an [`ItemProcessor`]
pub struct BatchQueueRunner<P> {
    processor: P,
    inter_item_delay: Duration,
    active: AtomicBool,
    state: Mutex<RunState>,
}

impl<P: ItemProcessor> BatchQueueRunner<P> {
    #[must_use]
    pub fn new(processor: P, inter_item_delay: Duration) -> Self {
        Self {
            processor,
            inter_item_delay,
            active: AtomicBool::new(false),
            state: Mutex::new(RunState::Idle),
        }
    }

    #[must_use]
    pub fn processor(&self) -> &P {
        &self.processor
    }

    #[must_use]
    pub fn inter_item_delay(&self) -> Duration {
        self.inter_item_delay
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.lock().map_or(RunState::Idle, |state| *state)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Process every item in order and return the final statuses
    ///
    /// # Errors
    /// - `NoInput` for an empty batch
    /// - `AlreadyRunning` if another run is active on this runner
    /// - Whatever the processor's preflight rejects (e.g. `Config`)
    ///
    /// Per-item failures are not errors here; they are recorded in the report.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn run(
        &self,
        items: Vec<QueuedItem>,
        cancel: &CancellationToken,
        observer: &dyn QueueObserver,
    ) -> Result<BatchReport> {
        let mut run = self.start(items, cancel.clone())?;
        observer.on_batch_start(run.items.len());

        while self.step(&mut run, observer).await.is_some() {}

        let report = run.into_report();
        info!(
            outcome = ?report.outcome,
            completed = report.completed_count(),
            failed = report.failed_count(),
            pending = report.pending_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch finished"
        );
        observer.on_batch_complete(&report);
        Ok(report)
    }

    /// Lazily process items, yielding `(index, item)` as each reaches a terminal state
    ///
    /// Nothing is processed until the stream is polled. The stream ends when
    /// all items are done or cancellation is observed; dropping it early
    /// releases the runner.
    ///
    /// # Errors
    /// Same batch-level checks as [`run`](Self::run).
    pub fn events(
        &self,
        items: Vec<QueuedItem>,
        cancel: CancellationToken,
    ) -> Result<impl Stream<Item = (usize, QueuedItem)> + '_> {
        let run = self.start(items, cancel)?;
        Ok(futures::stream::unfold(run, move |mut run| async move {
            let event = self.step(&mut run, &NoOpObserver).await?;
            Some((event, run))
        }))
    }

    fn start(&self, mut items: Vec<QueuedItem>, cancel: CancellationToken) -> Result<BatchRun<'_>> {
        if items.is_empty() {
            return Err(BatchError::NoInput);
        }
        self.processor.preflight()?;

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BatchError::AlreadyRunning);
        }
        let guard = ActiveGuard {
            active: &self.active,
            state: &self.state,
        };
        self.set_state(RunState::Running);

        for item in &mut items {
            item.reset();
        }
        info!(items = items.len(), "Starting batch");

        Ok(BatchRun {
            items,
            current_index: -1,
            cancel,
            outcome: None,
            last_aborted: false,
            started_at: Instant::now(),
            _guard: guard,
        })
    }

    /// Advance the run by one item; `None` once the run is terminal
    async fn step(
        &self,
        run: &mut BatchRun<'_>,
        observer: &dyn QueueObserver,
    ) -> Option<(usize, QueuedItem)> {
        if run.outcome.is_some() {
            return None;
        }

        let index = run.next_index();
        let total = run.items.len();
        if index >= total {
            // An abort of the final item still ends the run as cancelled
            let outcome = if run.last_aborted && run.cancel.is_cancelled() {
                RunOutcome::Cancelled
            } else {
                RunOutcome::Completed
            };
            self.finish(run, outcome);
            return None;
        }

        if index > 0 && !self.inter_item_delay.is_zero() && !run.cancel.is_cancelled() {
            debug!(
                delay_ms = self.inter_item_delay.as_millis() as u64,
                "Waiting before processing next image"
            );
            tokio::select! {
                () = tokio::time::sleep(self.inter_item_delay) => {},
                () = run.cancel.cancelled() => {},
            }
        }

        if run.cancel.is_cancelled() {
            info!(next_index = index, "Processing aborted");
            self.finish(run, RunOutcome::Cancelled);
            return None;
        }

        run.current_index = index as isize;
        let item_cancel = run.cancel.child_token();
        let Some(item) = run.items.get_mut(index) else {
            self.finish(run, RunOutcome::Completed);
            return None;
        };

        if let Err(e) = item.begin() {
            error!(index, error = %e, "Queue item in unexpected state");
            self.finish(run, RunOutcome::Cancelled);
            return None;
        }
        observer.on_item_start(index, item);
        info!("Processing image {}/{}: {}", index + 1, total, item.source.name());

        let span = spans::item_processing(index, item.source.name());
        let outcome = self
            .processor
            .process(&item.source, &item_cancel)
            .instrument(span)
            .await;

        run.last_aborted = matches!(outcome, Err(BatchError::Cancelled));
        let recorded = match outcome {
            Ok(result) => {
                debug!(index, "Image processed");
                item.complete(result)
            },
            Err(e) => {
                warn!(index, error = %e, "Error processing image");
                item.fail(e.to_string())
            },
        };
        if let Err(e) = recorded {
            error!(index, error = %e, "Failed to record item outcome");
        }

        observer.on_item_finished(index, item);
        Some((index, item.clone()))
    }

    fn finish(&self, run: &mut BatchRun<'_>, outcome: RunOutcome) {
        run.outcome = Some(outcome);
        self.set_state(outcome.into());
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }
}
