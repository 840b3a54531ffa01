//! Process-wide wiring shared by both stages

use crate::config::{GeminiStageConfig, RemovalConfig, RemovalStageConfig};
use crate::credentials::CredentialSlot;
use crate::error::Result;
use crate::gemini::{GeminiHttpClient, GeminiStage, QuickAction, VisionEditClient};
use crate::handoff::HandoffStore;
use crate::rate_limiter::RateLimiter;
use crate::removal::{BackgroundRemovalRunner, BackgroundRemover, ExternalCommandRemover};
use crate::storage::{FileStore, KeyValueStore};
use std::sync::Arc;

/// Persisted state and the shared rate limiter
///
/// One session per process: the limiter window and the hand-off must be
/// shared between every stage built from it.
#[derive(Clone)]
pub struct BatchSession {
    store: Arc<dyn KeyValueStore>,
    limiter: Arc<RateLimiter>,
    gemini: GeminiStageConfig,
    removal: RemovalStageConfig,
}

impl BatchSession {
    /// Session over the default data directory
    ///
    /// # Errors
    /// - Data directory cannot be resolved or created
    /// - Invalid stage configuration
    pub fn open(gemini: GeminiStageConfig, removal: RemovalStageConfig) -> Result<Self> {
        Self::with_store(Arc::new(FileStore::new()?), gemini, removal)
    }

    /// Session over an explicit store
    ///
    /// # Errors
    /// - Invalid stage configuration
    pub fn with_store(
        store: Arc<dyn KeyValueStore>,
        gemini: GeminiStageConfig,
        removal: RemovalStageConfig,
    ) -> Result<Self> {
        gemini.validate()?;
        let limiter = Arc::new(RateLimiter::new(gemini.max_calls_per_window, gemini.rate_window));
        Ok(Self {
            store,
            limiter,
            gemini,
            removal,
        })
    }

    /// Replace the rate limiter (e.g. one driven by a manual clock)
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn credentials(&self) -> CredentialSlot {
        CredentialSlot::new(Arc::clone(&self.store))
    }

    #[must_use]
    pub fn handoff(&self) -> HandoffStore {
        HandoffStore::new(Arc::clone(&self.store))
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn gemini_config(&self) -> &GeminiStageConfig {
        &self.gemini
    }

    #[must_use]
    pub fn removal_config(&self) -> &RemovalStageConfig {
        &self.removal
    }

    /// Generative-edit stage over the HTTP client
    ///
    /// # Errors
    /// - HTTP client construction failed
    pub fn gemini_stage(&self, action: QuickAction) -> Result<GeminiStage> {
        let client = Arc::new(GeminiHttpClient::new(&self.gemini)?);
        self.gemini_stage_with_client(client, action)
    }

    /// Generative-edit stage over a custom client
    ///
    /// # Errors
    /// - Invalid stage configuration
    pub fn gemini_stage_with_client(
        &self,
        client: Arc<dyn VisionEditClient>,
        action: QuickAction,
    ) -> Result<GeminiStage> {
        GeminiStage::new(
            &self.gemini,
            client,
            self.credentials(),
            Arc::clone(&self.limiter),
            self.handoff(),
            action,
        )
    }

    /// Removal stage over the configured external command
    #[must_use]
    pub fn removal_runner(&self, config: RemovalConfig) -> BackgroundRemovalRunner {
        let remover = Arc::new(ExternalCommandRemover::new(&self.removal.remover_command));
        self.removal_runner_with(remover, config)
    }

    /// Removal stage over a custom remover
    #[must_use]
    pub fn removal_runner_with(
        &self,
        remover: Arc<dyn BackgroundRemover>,
        config: RemovalConfig,
    ) -> BackgroundRemovalRunner {
        BackgroundRemovalRunner::new(remover, config, &self.removal, self.handoff())
    }
}

impl std::fmt::Debug for BatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSession")
            .field("limiter", &self.limiter)
            .field("gemini", &self.gemini)
            .field("removal", &self.removal)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_stages_share_state() {
        let session = BatchSession::with_store(
            Arc::new(MemoryStore::new()),
            GeminiStageConfig::default(),
            RemovalStageConfig::default(),
        )
        .unwrap();

        session.credentials().set("AIza-key").unwrap();
        assert_eq!(session.credentials().get().unwrap().as_deref(), Some("AIza-key"));

        let stage = session.gemini_stage(QuickAction::default()).unwrap();
        assert!(Arc::ptr_eq(stage.runner().processor().limiter(), session.limiter()));
        assert_eq!(session.limiter().max_calls(), 10);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let gemini = GeminiStageConfig {
            max_batch_size: 0,
            ..GeminiStageConfig::default()
        };
        let result = BatchSession::with_store(
            Arc::new(MemoryStore::new()),
            gemini,
            RemovalStageConfig::default(),
        );
        assert!(result.is_err());
    }
}
