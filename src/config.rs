//! Configuration types for both pipeline stages

use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the persisted-state directory
pub const DATA_DIR_ENV: &str = "BGREMOVE_BATCH_DATA_DIR";

/// Default generative model for image edits
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

/// Default API endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Background-removal model size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    /// Full precision model, best quality
    Large,
    /// Half precision model
    Medium,
    /// Quantized model, fastest
    Small,
}

impl Default for ModelSize {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Large => write!(f, "large"),
            Self::Medium => write!(f, "medium"),
            Self::Small => write!(f, "small"),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    Png,
    /// JPEG (no transparency)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

/// Which layer of the segmentation is written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Foreground,
    Background,
    Mask,
}

impl Default for OutputType {
    fn default() -> Self {
        Self::Foreground
    }
}

/// Output settings handed to the background remover
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Encoder quality in `[0.1, 1.0]`
    pub quality: f32,
    #[serde(rename = "type")]
    pub output_type: OutputType,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: 0.8,
            output_type: OutputType::default(),
        }
    }
}

/// Configuration for one background-removal call
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RemovalConfig {
    pub model: ModelSize,
    pub output: OutputConfig,
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_batch::config::{ModelSize, OutputFormat, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .model(ModelSize::Large)
    ///     .format(OutputFormat::WebP)
    ///     .quality(0.9)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.output.format, OutputFormat::WebP);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Quality outside `[0.1, 1.0]` or not a number
    pub fn validate(&self) -> Result<()> {
        let quality = self.output.quality;
        if !(0.1..=1.0).contains(&quality) {
            return Err(BatchError::config_value_error(
                "output quality",
                quality,
                "0.1-1.0",
                Some(0.8),
            ));
        }
        Ok(())
    }

    /// Quality mapped onto the 0-100 scale encoders expect
    #[must_use]
    pub fn quality_percent(&self) -> u8 {
        (self.output.quality.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model(mut self, model: ModelSize) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.output.format = format;
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: f32) -> Self {
        self.config.output.quality = quality;
        self
    }

    #[must_use]
    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.config.output.output_type = output_type;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any value rejected by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Settings for the generative-edit stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiStageConfig {
    /// Model name used in the `generateContent` path
    pub model: String,
    /// API base URL (overridable for testing and proxies)
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// Maximum images accepted into one batch
    pub max_batch_size: usize,
    /// Pause between consecutive items
    #[serde(with = "duration_millis")]
    pub inter_item_delay: Duration,
    /// Sliding window for local admission control
    #[serde(with = "duration_millis")]
    pub rate_window: Duration,
    /// Calls allowed inside one window
    pub max_calls_per_window: usize,
}

impl Default for GeminiStageConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            max_batch_size: 5,
            inter_item_delay: Duration::from_millis(2000),
            rate_window: Duration::from_secs(60),
            max_calls_per_window: 10,
        }
    }
}

impl GeminiStageConfig {
    #[must_use]
    pub fn builder() -> GeminiStageConfigBuilder {
        GeminiStageConfigBuilder::default()
    }

    /// # Errors
    /// - Empty model name, zero batch size, zero window or zero call ceiling
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(BatchError::invalid_config("Gemini model name must not be empty"));
        }
        if self.max_batch_size == 0 {
            return Err(BatchError::config_value_error(
                "max batch size",
                self.max_batch_size,
                ">= 1",
                Some(5),
            ));
        }
        if self.rate_window.is_zero() {
            return Err(BatchError::invalid_config("Rate window must be longer than zero"));
        }
        if self.max_calls_per_window == 0 {
            return Err(BatchError::config_value_error(
                "max calls per window",
                self.max_calls_per_window,
                ">= 1",
                Some(10),
            ));
        }
        Ok(())
    }
}

/// Builder for `GeminiStageConfig`
#[derive(Debug, Default)]
pub struct GeminiStageConfigBuilder {
    config: GeminiStageConfig,
}

impl GeminiStageConfigBuilder {
    #[must_use]
    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.config.model = model.into();
        self
    }

    #[must_use]
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    #[must_use]
    pub fn inter_item_delay(mut self, delay: Duration) -> Self {
        self.config.inter_item_delay = delay;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, max_calls: usize, window: Duration) -> Self {
        self.config.max_calls_per_window = max_calls;
        self.config.rate_window = window;
        self
    }

    /// # Errors
    /// - Any value rejected by [`GeminiStageConfig::validate`]
    pub fn build(self) -> Result<GeminiStageConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Settings for the local background-removal stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalStageConfig {
    /// Short settling pause between consecutive items
    #[serde(with = "duration_millis")]
    pub inter_item_delay: Duration,
    /// Executable used by the external-command remover
    pub remover_command: String,
}

impl Default for RemovalStageConfig {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(500),
            remover_command: "imgly-bgremove".to_string(),
        }
    }
}

/// Resolve the directory holding persisted state (credential, hand-off)
///
/// Uses `BGREMOVE_BATCH_DATA_DIR` when set, otherwise the platform data
/// directory (`~/.local/share/bgremove-batch` on Linux).
///
/// # Errors
/// - No platform data directory and no override
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir_override) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir_override));
    }

    Ok(dirs::data_dir()
        .ok_or_else(|| {
            BatchError::invalid_config(format!(
                "Failed to determine data directory. Set {} environment variable.",
                DATA_DIR_ENV
            ))
        })?
        .join("bgremove-batch"))
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_config_defaults() {
        let config = RemovalConfig::default();
        assert_eq!(config.model, ModelSize::Medium);
        assert_eq!(config.output.format, OutputFormat::Png);
        assert!((config.output.quality - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.output.output_type, OutputType::Foreground);
        assert!(config.validate().is_ok());
        assert_eq!(config.quality_percent(), 80);
    }

    #[test]
    fn test_removal_config_quality_bounds() {
        assert!(RemovalConfig::builder().quality(0.1).build().is_ok());
        assert!(RemovalConfig::builder().quality(1.0).build().is_ok());
        assert!(RemovalConfig::builder().quality(0.05).build().is_err());
        assert!(RemovalConfig::builder().quality(1.5).build().is_err());
        assert!(RemovalConfig::builder().quality(f32::NAN).build().is_err());
    }

    #[test]
    fn test_removal_config_serde_shape() {
        let config = RemovalConfig::builder()
            .model(ModelSize::Small)
            .format(OutputFormat::WebP)
            .output_type(OutputType::Mask)
            .build()
            .unwrap();
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["model"], "small");
        assert_eq!(json["output"]["format"], "webp");
        assert_eq!(json["output"]["type"], "mask");

        let back: RemovalConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_gemini_stage_defaults() {
        let config = GeminiStageConfig::default();
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.inter_item_delay, Duration::from_secs(2));
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.max_calls_per_window, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gemini_stage_builder_validation() {
        assert!(GeminiStageConfig::builder().max_batch_size(0).build().is_err());
        assert!(GeminiStageConfig::builder().model("  ").build().is_err());
        assert!(GeminiStageConfig::builder()
            .rate_limit(0, Duration::from_secs(60))
            .build()
            .is_err());
        assert!(GeminiStageConfig::builder()
            .rate_limit(10, Duration::ZERO)
            .build()
            .is_err());

        let config = GeminiStageConfig::builder()
            .inter_item_delay(Duration::from_millis(250))
            .base_url("http://localhost:9999")
            .build()
            .unwrap();
        assert_eq!(config.inter_item_delay, Duration::from_millis(250));
        assert_eq!(config.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_stage_config_durations_serialize_as_millis() {
        let json = serde_json::to_value(RemovalStageConfig::default()).unwrap();
        assert_eq!(json["inter_item_delay"], 500);

        let json = serde_json::to_value(GeminiStageConfig::default()).unwrap();
        assert_eq!(json["inter_item_delay"], 2000);
        assert_eq!(json["rate_window"], 60000);
    }
}
