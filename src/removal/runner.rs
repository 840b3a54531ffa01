//! Consumes the hand-off through the shared queue loop

use super::{BackgroundRemover, RemovalProcessor};
use crate::config::{RemovalConfig, RemovalStageConfig};
use crate::error::{BatchError, Result};
use crate::handoff::HandoffStore;
use crate::queue::{BatchQueueRunner, BatchReport};
use crate::services::QueueObserver;
use crate::tracing_config::spans;
use crate::types::{HandoffRecord, ImageSource, QueuedItem};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

/// Background-removal stage over a pending hand-off
pub struct BackgroundRemovalRunner {
    runner: BatchQueueRunner<RemovalProcessor>,
    handoff: HandoffStore,
}

impl BackgroundRemovalRunner {
    #[must_use]
    pub fn new(
        remover: Arc<dyn BackgroundRemover>,
        config: RemovalConfig,
        stage: &RemovalStageConfig,
        handoff: HandoffStore,
    ) -> Self {
        Self {
            runner: BatchQueueRunner::new(RemovalProcessor::new(remover, config), stage.inter_item_delay),
            handoff,
        }
    }

    #[must_use]
    pub fn runner(&self) -> &BatchQueueRunner<RemovalProcessor> {
        &self.runner
    }

    /// Records currently waiting
    ///
    /// # Errors
    /// - Hand-off could not be read
    pub fn pending(&self) -> Result<Vec<HandoffRecord>> {
        self.handoff.take_pending()
    }

    /// Pending records turned into fresh queued items
    ///
    /// A record whose result cannot be decoded still yields an item, with no
    /// image data, so it fails on its own when processed.
    ///
    /// # Errors
    /// - Hand-off could not be read
    pub fn load_pending(&self) -> Result<Vec<QueuedItem>> {
        Ok(self.pending()?.iter().map(Self::queued_item).collect())
    }

    fn queued_item(record: &HandoffRecord) -> QueuedItem {
        record.to_queued_item().unwrap_or_else(|e| {
            warn!(id = %record.id, error = %e, "Unusable hand-off record");
            let source = ImageSource::new(record.file.name.clone(), record.file.mime_type.clone(), Vec::new());
            QueuedItem::with_id(record.id.clone(), source, record.preview.clone())
        })
    }

    /// Run removal over every pending record
    ///
    /// The hand-off is discarded only when every item completed; otherwise
    /// it is kept so the user can retry.
    ///
    /// # Errors
    /// - `NoInput` when nothing is pending
    /// - Batch-level errors from [`BatchQueueRunner::run`]
    /// - Hand-off read or discard failure
    pub async fn process_pending(
        &self,
        cancel: &CancellationToken,
        observer: &dyn QueueObserver,
    ) -> Result<BatchReport> {
        let items = self.load_pending()?;
        if items.is_empty() {
            return Err(BatchError::NoInput);
        }

        let span = spans::batch_processing("removal", items.len());
        let report = self.runner.run(items, cancel, observer).instrument(span).await?;

        if report.is_fully_completed() {
            self.handoff.discard()?;
            info!(items = report.items.len(), "All hand-off images processed");
        } else {
            warn!(
                failed = report.failed_count(),
                pending = report.pending_count(),
                "Keeping hand-off for retry"
            );
        }
        Ok(report)
    }

    /// Drop the pending hand-off without processing it
    ///
    /// # Errors
    /// - Storage failure
    pub fn reject(&self) -> Result<()> {
        self.handoff.discard()
    }
}
