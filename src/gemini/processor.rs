//! One generative edit per queued image

use super::actions::QuickAction;
use super::client::VisionEditClient;
use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part};
use crate::credentials::CredentialSlot;
use crate::error::{BatchError, Result};
use crate::queue::ItemProcessor;
use crate::rate_limiter::RateLimiter;
use crate::tracing_config::spans;
use crate::types::{DataUri, ImageSource};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

/// Applies a [`QuickAction`] to an image through the remote model
pub struct GeminiImageProcessor {
    client: Arc<dyn VisionEditClient>,
    credentials: CredentialSlot,
    limiter: Arc<RateLimiter>,
    action: QuickAction,
}

impl GeminiImageProcessor {
    #[must_use]
    pub fn new(
        client: Arc<dyn VisionEditClient>,
        credentials: CredentialSlot,
        limiter: Arc<RateLimiter>,
        action: QuickAction,
    ) -> Self {
        Self {
            client,
            credentials,
            limiter,
            action,
        }
    }

    #[must_use]
    pub fn action(&self) -> QuickAction {
        self.action
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Build the single-turn edit request for `source`
    #[must_use]
    pub fn build_request(source: &ImageSource, action: &QuickAction) -> GenerateContentRequest {
        let encoded = general_purpose::STANDARD.encode(source.bytes());
        GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::inline_data(source.mime_type(), encoded),
                Part::text(action.prompt),
            ])],
            generation_config: Some(GenerationConfig::image_edit()),
        }
    }

    /// First image part of the first candidate, as a data URI
    ///
    /// # Errors
    /// - `Extraction` when there is no candidate content or no image part
    pub fn extract_image(response: &GenerateContentResponse) -> Result<DataUri> {
        let parts = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| &content.parts)
            .ok_or_else(|| BatchError::extraction("Invalid response from Gemini API"))?;

        parts
            .iter()
            .find_map(|part| match part {
                Part::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
                    Some(DataUri::new(inline_data.mime_type.clone(), inline_data.data.clone()))
                },
                _ => None,
            })
            .ok_or_else(|| BatchError::extraction("No processed image found in response"))
    }

    fn require_credential(&self) -> Result<String> {
        self.credentials
            .get()?
            .ok_or_else(|| BatchError::config("API key is required"))
    }
}

#[async_trait]
impl ItemProcessor for GeminiImageProcessor {
    fn preflight(&self) -> Result<()> {
        self.require_credential().map(|_| ())
    }

    async fn process(&self, source: &ImageSource, cancel: &CancellationToken) -> Result<DataUri> {
        // Read on every call so a key edited mid-session applies immediately
        let credential = self.require_credential()?;

        if self.limiter.should_throttle() {
            return Err(BatchError::RateLimit {
                wait_secs: self.limiter.estimated_wait_secs(),
            });
        }
        self.limiter.record_call();
        debug!(
            calls_in_window = self.limiter.calls_in_window(),
            action = self.action.id,
            "Sending edit request"
        );

        let request = Self::build_request(source, &self.action);
        let span = spans::remote_call(self.client.model(), self.action.id);
        let response = self
            .client
            .generate(&credential, &request, cancel)
            .instrument(span)
            .await?;

        Self::extract_image(&response)
    }
}

impl std::fmt::Debug for GeminiImageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiImageProcessor")
            .field("model", &self.client.model())
            .field("action", &self.action.id)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::types::{Candidate, InlineData};
    use crate::rate_limiter::ManualClock;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Canned client recording the requests it receives
    struct CannedClient {
        response: GenerateContentResponse,
        requests: Mutex<Vec<(String, GenerateContentRequest)>>,
    }

    impl CannedClient {
        fn returning(parts: Vec<Part>) -> Self {
            Self {
                response: GenerateContentResponse {
                    candidates: vec![Candidate {
                        content: Some(Content { role: None, parts }),
                        finish_reason: None,
                    }],
                    usage_metadata: None,
                },
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionEditClient for CannedClient {
        async fn generate(
            &self,
            credential: &str,
            request: &GenerateContentRequest,
            _cancel: &CancellationToken,
        ) -> Result<GenerateContentResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((credential.to_string(), request.clone()));
            Ok(self.response.clone())
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    fn source() -> ImageSource {
        ImageSource::new("cat.png", "image/png", vec![1, 2, 3])
    }

    fn processor(client: Arc<CannedClient>, key: Option<&str>) -> (GeminiImageProcessor, ManualClock) {
        let credentials = CredentialSlot::new(Arc::new(MemoryStore::new()));
        if let Some(key) = key {
            credentials.set(key).unwrap();
        }
        let clock = ManualClock::new();
        let limiter = Arc::new(RateLimiter::with_clock(
            10,
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        (
            GeminiImageProcessor::new(client, credentials, limiter, QuickAction::default()),
            clock,
        )
    }

    #[test]
    fn test_build_request_layout() {
        let request = GeminiImageProcessor::build_request(&source(), &QuickAction::find("cartoon").unwrap());
        let parts = &request.contents[0].parts;
        assert_eq!(parts[0], Part::inline_data("image/png", "AQID"));
        assert_eq!(parts[1], Part::text("Convert this image into a cartoon style illustration"));
        assert_eq!(request.generation_config, Some(GenerationConfig::image_edit()));
    }

    #[test]
    fn test_extract_skips_text_and_non_image_parts() {
        let response = CannedClient::returning(vec![
            Part::text("Sure!"),
            Part::inline_data("application/pdf", "JVBE"),
            Part::inline_data("image/png", "iVBO"),
            Part::inline_data("image/jpeg", "/9j/"),
        ])
        .response;
        let uri = GeminiImageProcessor::extract_image(&response).unwrap();
        assert_eq!(uri.to_string(), "data:image/png;base64,iVBO");
    }

    #[test]
    fn test_extract_errors() {
        let text_only = CannedClient::returning(vec![Part::text("I cannot do that")]).response;
        let err = GeminiImageProcessor::extract_image(&text_only).unwrap_err();
        assert_eq!(err.to_string(), "Extraction error: No processed image found in response");

        let empty = GenerateContentResponse::default();
        let err = GeminiImageProcessor::extract_image(&empty).unwrap_err();
        assert!(err.to_string().contains("Invalid response"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_config_error() {
        let client = Arc::new(CannedClient::returning(vec![]));
        let (processor, _) = processor(client.clone(), None);

        assert!(matches!(processor.preflight(), Err(BatchError::Config(_))));
        let err = processor.process(&source(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BatchError::Config(_)));
        assert!(client.requests.lock().unwrap().is_empty());
        assert_eq!(processor.limiter().calls_in_window(), 0);
    }

    #[tokio::test]
    async fn test_successful_call_records_rate_and_sends_key() {
        let client = Arc::new(CannedClient::returning(vec![Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/png".to_string(),
                data: "iVBO".to_string(),
            },
        }]));
        let (processor, _) = processor(client.clone(), Some("AIza-key"));

        let uri = processor.process(&source(), &CancellationToken::new()).await.unwrap();
        assert_eq!(uri.mime_type(), "image/png");
        assert_eq!(processor.limiter().calls_in_window(), 1);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "AIza-key");
    }

    #[tokio::test]
    async fn test_throttled_call_reports_wait_without_calling() {
        let client = Arc::new(CannedClient::returning(vec![Part::inline_data("image/png", "iVBO")]));
        let (processor, clock) = processor(client.clone(), Some("AIza-key"));
        for _ in 0..10 {
            processor.limiter().record_call();
        }
        clock.set(Duration::from_secs(5));

        let err = processor.process(&source(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.retry_after_secs(), Some(55));
        assert!(client.requests.lock().unwrap().is_empty());
        // Denied calls are not recorded
        assert_eq!(processor.limiter().calls_in_window(), 10);
    }
}
