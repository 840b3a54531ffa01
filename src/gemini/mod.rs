//! Generative image-edit stage
//!
//! A [`GeminiImageProcessor`] plugs into the shared
//! [`BatchQueueRunner`](crate::queue::BatchQueueRunner); [`GeminiStage`]
//! wires it to the stage configuration and a process-wide rate limiter.

pub mod actions;
pub mod client;
pub mod processor;
pub mod types;

pub use actions::{QuickAction, QUICK_ACTIONS};
pub use client::{GeminiHttpClient, VisionEditClient};
pub use processor::GeminiImageProcessor;

use crate::config::GeminiStageConfig;
use crate::credentials::CredentialSlot;
use crate::error::{BatchError, Result};
use crate::handoff::HandoffStore;
use crate::queue::{BatchQueueRunner, BatchReport};
use crate::rate_limiter::RateLimiter;
use crate::services::QueueObserver;
use crate::tracing_config::spans;
use crate::types::QueuedItem;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};

/// The generative-edit stage: queue runner plus hand-off publishing
pub struct GeminiStage {
    runner: BatchQueueRunner<GeminiImageProcessor>,
    handoff: HandoffStore,
    max_batch_size: usize,
}

impl GeminiStage {
    /// Wire a stage from its parts
    ///
    /// The limiter is shared so its window survives across stages and runs.
    ///
    /// # Errors
    /// - Invalid stage configuration
    pub fn new(
        config: &GeminiStageConfig,
        client: Arc<dyn VisionEditClient>,
        credentials: CredentialSlot,
        limiter: Arc<RateLimiter>,
        handoff: HandoffStore,
        action: QuickAction,
    ) -> Result<Self> {
        config.validate()?;
        let processor = GeminiImageProcessor::new(client, credentials, limiter, action);
        Ok(Self {
            runner: BatchQueueRunner::new(processor, config.inter_item_delay),
            handoff,
            max_batch_size: config.max_batch_size,
        })
    }

    #[must_use]
    pub fn runner(&self) -> &BatchQueueRunner<GeminiImageProcessor> {
        &self.runner
    }

    /// Process a batch of images
    ///
    /// # Errors
    /// - `InvalidInput` when the batch exceeds the configured maximum
    /// - Batch-level errors from [`BatchQueueRunner::run`]
    pub async fn process(
        &self,
        items: Vec<QueuedItem>,
        cancel: &CancellationToken,
        observer: &dyn QueueObserver,
    ) -> Result<BatchReport> {
        if items.len() > self.max_batch_size {
            return Err(BatchError::invalid_input(format!(
                "Maximum {} images allowed per batch, got {}",
                self.max_batch_size,
                items.len()
            )));
        }

        let span = spans::batch_processing("gemini", items.len());
        let report = self.runner.run(items, cancel, observer).instrument(span).await?;
        if report.outcome == crate::queue::RunOutcome::Cancelled {
            warn!("Processing cancelled");
        }
        Ok(report)
    }

    /// Publish a finished batch's completed items for the removal stage
    ///
    /// # Errors
    /// - `NoCompletedItems` when nothing succeeded
    /// - Storage failure
    pub fn send_to_removal(&self, report: &BatchReport) -> Result<usize> {
        self.handoff.publish_completed(&report.items)
    }
}
