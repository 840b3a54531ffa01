//! Local background-removal stage
//!
//! The model call itself is behind [`BackgroundRemover`]; this module only
//! adapts it to the shared queue and consumes the hand-off.

pub mod command;
pub mod runner;

pub use command::ExternalCommandRemover;
pub use runner::BackgroundRemovalRunner;

use crate::config::RemovalConfig;
use crate::error::{BatchError, Result};
use crate::queue::ItemProcessor;
use crate::services::OutputFormatHandler;
use crate::types::{DataUri, ImageSource};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Opaque local model call
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background of `source`, returning encoded image bytes in
    /// `config.output.format`
    ///
    /// # Errors
    /// - Any failure of the underlying model call
    async fn remove_background(&self, source: &ImageSource, config: &RemovalConfig) -> Result<Vec<u8>>;
}

/// Queue processor wrapping a [`BackgroundRemover`]
pub struct RemovalProcessor {
    remover: Arc<dyn BackgroundRemover>,
    config: RemovalConfig,
}

impl RemovalProcessor {
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>, config: RemovalConfig) -> Self {
        Self { remover, config }
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }
}

#[async_trait]
impl ItemProcessor for RemovalProcessor {
    fn preflight(&self) -> Result<()> {
        self.config.validate()?;
        OutputFormatHandler::validate_for_background_removal(self.config.output.format);
        Ok(())
    }

    async fn process(&self, source: &ImageSource, cancel: &CancellationToken) -> Result<DataUri> {
        if source.bytes().is_empty() {
            return Err(BatchError::invalid_input(format!(
                "No usable image data for {}",
                source.name()
            )));
        }

        let bytes = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BatchError::Cancelled),
            result = self.remover.remove_background(source, &self.config) => result?,
        };
        if bytes.is_empty() {
            return Err(BatchError::extraction("Background removal produced no output"));
        }

        let mime_type = OutputFormatHandler::mime_type(self.config.output.format);
        Ok(DataUri::from_bytes(mime_type, &bytes))
    }
}
