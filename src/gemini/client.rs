//! HTTP client for the Gemini `generateContent` endpoint

use super::types::{GeminiError, GenerateContentRequest, GenerateContentResponse};
use crate::config::GeminiStageConfig;
use crate::error::{BatchError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Remote generative image-edit call
#[async_trait]
pub trait VisionEditClient: Send + Sync {
    /// Send one request and return the parsed response
    ///
    /// # Errors
    /// - `Remote` for transport failures and non-success statuses
    /// - `Extraction` when the body is not a valid response
    /// - `Cancelled` when `cancel` fires before the response arrives
    async fn generate(
        &self,
        credential: &str,
        request: &GenerateContentRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateContentResponse>;

    /// Model name, for logging
    fn model(&self) -> &str;
}

/// `reqwest`-backed Gemini client
#[derive(Debug, Clone)]
pub struct GeminiHttpClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiHttpClient {
    /// Build a client from stage configuration
    ///
    /// # Errors
    /// - HTTP client construction failed
    pub fn new(config: &GeminiStageConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| BatchError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Full endpoint URL for the configured model
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send(
        &self,
        credential: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", credential)
            .json(request)
            .send()
            .await
            .map_err(|e| BatchError::remote(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BatchError::remote(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Gemini API request failed");
            return Err(BatchError::remote(format!("API error ({}): {}", status, message)));
        }

        debug!(bytes = body.len(), "Gemini API response received");
        serde_json::from_str(&body)
            .map_err(|e| BatchError::extraction(format!("Invalid response from API: {}", e)))
    }
}

#[async_trait]
impl VisionEditClient for GeminiHttpClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(
        &self,
        credential: &str,
        request: &GenerateContentRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateContentResponse> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Dropping in-flight request after cancellation");
                Err(BatchError::Cancelled)
            },
            result = self.send(credential, request) => result,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = GeminiStageConfig::builder()
            .base_url("http://localhost:8080/")
            .model("gemini-test")
            .build()
            .unwrap();
        let client = GeminiHttpClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-test:generateContent"
        );
        assert_eq!(client.model(), "gemini-test");
    }

    #[tokio::test]
    async fn test_pre_cancelled_request_is_not_sent() {
        let config = GeminiStageConfig::builder()
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let client = GeminiHttpClient::new(&config).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = GenerateContentRequest {
            contents: Vec::new(),
            generation_config: None,
        };
        let err = client.generate("key", &request, &cancel).await.unwrap_err();
        assert!(matches!(err, BatchError::Cancelled));
    }
}
