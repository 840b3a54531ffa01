//! Progress reporting service
//!
//! Separates progress reporting from the queue loop so each front-end can
//! render batch progress its own way.

use crate::queue::{BatchReport, RunOutcome};
use crate::types::{QueuedItem, StatusKind};
use instant::Instant;
use std::sync::Mutex;

/// Receives queue transitions as they happen
///
/// Every method has an empty default so observers only implement what they
/// render. Callbacks run inline on the queue task and should return quickly.
pub trait QueueObserver: Send + Sync {
    /// A run is starting with `total` items
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Item at `index` moved to `processing`
    fn on_item_start(&self, index: usize, item: &QueuedItem) {
        let _ = (index, item);
    }

    /// Item at `index` reached `completed` or `error`
    fn on_item_finished(&self, index: usize, item: &QueuedItem) {
        let _ = (index, item);
    }

    /// The run ended, either fully or through cancellation
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// Observer that discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl QueueObserver for NoOpObserver {}

/// Running statistics for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgressStats {
    pub items_total: usize,
    pub items_completed: usize,
    pub items_failed: usize,
    /// Items per second over the elapsed time
    pub processing_rate: f64,
    /// Estimated seconds remaining, once a rate is known
    pub eta_seconds: Option<u64>,
}

impl BatchProgressStats {
    fn new(items_total: usize) -> Self {
        Self {
            items_total,
            items_completed: 0,
            items_failed: 0,
            processing_rate: 0.0,
            eta_seconds: None,
        }
    }

    /// Items that reached a terminal state
    #[must_use]
    pub fn items_done(&self) -> usize {
        self.items_completed + self.items_failed
    }

    /// Overall progress, 0-100
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        ((self.items_done() * 100) / self.items_total) as u8
    }

    fn record(&mut self, kind: StatusKind, elapsed_secs: f64) {
        match kind {
            StatusKind::Completed => self.items_completed += 1,
            StatusKind::Error => self.items_failed += 1,
            StatusKind::Queued | StatusKind::Processing => return,
        }
        if elapsed_secs > 0.0 {
            self.processing_rate = self.items_done() as f64 / elapsed_secs;
            let remaining = self.items_total.saturating_sub(self.items_done());
            self.eta_seconds = Some((remaining as f64 / self.processing_rate).ceil() as u64);
        }
    }
}

/// Console observer that logs progress lines
pub struct ConsoleObserver {
    verbose: bool,
    state: Mutex<Option<(Instant, BatchProgressStats)>>,
}

impl ConsoleObserver {
    /// Create a new console observer
    ///
    /// # Arguments
    /// * `verbose` - Whether to log rate and ETA after each item
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            state: Mutex::new(None),
        }
    }

    /// Snapshot of the current batch statistics
    #[must_use]
    pub fn stats(&self) -> Option<BatchProgressStats> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.as_ref().map(|(_, stats)| stats.clone()))
    }

    /// Format seconds as a short human-readable duration
    fn format_eta(eta_seconds: Option<u64>) -> String {
        match eta_seconds {
            Some(seconds) if seconds < 60 => format!("{}s", seconds),
            Some(seconds) => format!("{}m {}s", seconds / 60, seconds % 60),
            None => "calculating...".to_string(),
        }
    }

    /// Format a simple progress bar
    fn progress_bar(percentage: u8) -> String {
        let filled = (usize::from(percentage.min(100)) * 20) / 100;
        format!("{}{}", "█".repeat(filled), "░".repeat(20 - filled))
    }
}

impl QueueObserver for ConsoleObserver {
    fn on_batch_start(&self, total: usize) {
        if let Ok(mut state) = self.state.lock() {
            *state = Some((Instant::now(), BatchProgressStats::new(total)));
        }
        log::info!("📁 Processing {} image(s)", total);
    }

    fn on_item_start(&self, index: usize, item: &QueuedItem) {
        let total = self.stats().map_or(0, |s| s.items_total);
        log::info!("Processing image {} of {}: {}", index + 1, total, item.source.name());
    }

    fn on_item_finished(&self, index: usize, item: &QueuedItem) {
        let stats = self.state.lock().ok().and_then(|mut state| {
            state.as_mut().map(|(started, stats)| {
                stats.record(item.kind(), started.elapsed().as_secs_f64());
                stats.clone()
            })
        });

        match item.error_message() {
            Some(message) => log::error!("❌ [{}] {}: {}", index + 1, item.source.name(), message),
            None => log::info!("✅ [{}] {}", index + 1, item.source.name()),
        }

        if let (true, Some(stats)) = (self.verbose, stats) {
            log::info!(
                "[{}] {}% ({}/{}, {:.2} items/sec, ETA {})",
                Self::progress_bar(stats.percentage()),
                stats.percentage(),
                stats.items_done(),
                stats.items_total,
                stats.processing_rate,
                Self::format_eta(stats.eta_seconds)
            );
        }
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        match report.outcome {
            RunOutcome::Completed => log::info!(
                "Batch finished in {}ms: {} completed, {} failed",
                report.elapsed.as_millis(),
                report.completed_count(),
                report.failed_count()
            ),
            RunOutcome::Cancelled => log::warn!(
                "Processing cancelled: {} completed, {} failed, {} not started",
                report.completed_count(),
                report.failed_count(),
                report.pending_count()
            ),
        }
    }
}

/// Observer that emits structured tracing events
#[derive(Debug, Clone)]
pub struct TracingObserver {
    stage: &'static str,
}

impl TracingObserver {
    #[must_use]
    pub fn new(stage: &'static str) -> Self {
        Self { stage }
    }
}

impl QueueObserver for TracingObserver {
    fn on_batch_start(&self, total: usize) {
        tracing::info!(stage = self.stage, total, "batch started");
    }

    fn on_item_start(&self, index: usize, item: &QueuedItem) {
        tracing::debug!(stage = self.stage, index, id = %item.id, "item started");
    }

    fn on_item_finished(&self, index: usize, item: &QueuedItem) {
        tracing::info!(
            stage = self.stage,
            index,
            id = %item.id,
            status = %item.kind(),
            error = item.error_message(),
            "item finished"
        );
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        tracing::info!(
            stage = self.stage,
            outcome = ?report.outcome,
            completed = report.completed_count(),
            failed = report.failed_count(),
            pending = report.pending_count(),
            "batch complete"
        );
    }
}

/// Forwards every notification to several observers in order
#[derive(Default)]
pub struct CompositeObserver<'a> {
    observers: Vec<&'a dyn QueueObserver>,
}

impl<'a> CompositeObserver<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: &'a dyn QueueObserver) -> Self {
        self.observers.push(observer);
        self
    }
}

impl QueueObserver for CompositeObserver<'_> {
    fn on_batch_start(&self, total: usize) {
        for observer in &self.observers {
            observer.on_batch_start(total);
        }
    }

    fn on_item_start(&self, index: usize, item: &QueuedItem) {
        for observer in &self.observers {
            observer.on_item_start(index, item);
        }
    }

    fn on_item_finished(&self, index: usize, item: &QueuedItem) {
        for observer in &self.observers {
            observer.on_item_finished(index, item);
        }
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        for observer in &self.observers {
            observer.on_batch_complete(report);
        }
    }
}
