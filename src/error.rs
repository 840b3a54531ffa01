//! Error types for batch processing operations

use thiserror::Error;

/// Result type alias for batch processing operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Error taxonomy for the batch pipelines
///
/// The first four variants are the per-call failures a processor can report;
/// the batch runner records them on the failing item and moves on. The rest
/// are either batch-level (they stop a run from starting) or ambient
/// plumbing failures.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Required configuration is missing (e.g. no API credential stored)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local admission control refused the call
    #[error("Rate limit reached. Please wait {wait_secs} seconds before trying again.")]
    RateLimit { wait_secs: u64 },

    /// The remote or model call itself failed
    #[error("Remote call failed: {0}")]
    Remote(String),

    /// The call succeeded but carried no usable output
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A batch was started with nothing in it
    #[error("No images to process")]
    NoInput,

    /// A hand-off was requested but no item completed successfully
    #[error("No successfully processed images to send")]
    NoCompletedItems,

    /// A run is already active on this runner
    #[error("Cannot start a batch while processing is in progress")]
    AlreadyRunning,

    /// Processing was cancelled before the call finished
    #[error("Processing cancelled")]
    Cancelled,

    /// Invalid configuration values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejected input (unsupported file, malformed data URI, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Item status machine violated
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    /// Persisted storage failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Input/output errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new remote call error
    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a new extraction error
    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error belongs to a single item rather than the whole batch
    #[must_use]
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. } | Self::Remote(_) | Self::Extraction(_) | Self::Cancelled
        )
    }

    /// Suggested wait before retrying, for rate limit denials
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit { wait_secs } => Some(*wait_secs),
            _ => None,
        }
    }
}
