//! Terminal progress bar for batch runs

use crate::queue::{BatchReport, RunOutcome};
use crate::services::QueueObserver;
use crate::types::QueuedItem;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Observer drawing one indicatif bar per batch
#[derive(Default)]
pub(crate) struct ProgressBarObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressBarObserver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_bar<F: FnOnce(&ProgressBar)>(&self, f: F) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl QueueObserver for ProgressBarObserver {
    fn on_batch_start(&self, total: usize) {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_item_start(&self, _index: usize, item: &QueuedItem) {
        self.with_bar(|bar| bar.set_message(item.source.name().to_string()));
    }

    fn on_item_finished(&self, _index: usize, item: &QueuedItem) {
        self.with_bar(|bar| {
            if let Some(message) = item.error_message() {
                bar.println(format!("❌ {}: {}", item.source.name(), message));
            }
            bar.inc(1);
        });
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        let summary = match report.outcome {
            RunOutcome::Completed => format!(
                "{} completed, {} failed",
                report.completed_count(),
                report.failed_count()
            ),
            RunOutcome::Cancelled => format!("cancelled, {} not started", report.pending_count()),
        };
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_with_message(summary);
            }
        }
    }
}
