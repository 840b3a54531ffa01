#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Batch Background Pipelines
//!
//! Sequential batch orchestration for two image pipelines: a generative
//! image-editing stage backed by the Gemini API and a local background-removal
//! stage, joined by a persisted hand-off.
//!
//! ## Features
//!
//! - **One queue loop for both stages**: strict FIFO, one item at a time,
//!   per-item error isolation, cooperative cancellation and a configurable
//!   pause between items
//! - **Local admission control**: a sliding-window rate limiter shared across runs
//! - **Hand-off**: completed generative results are persisted for the removal
//!   stage and cleared once fully consumed
//! - **Pluggable collaborators**: the remote call and the model call sit
//!   behind traits, so tests and other front-ends can swap them
//! - **CLI Integration**: optional `bgremove-batch` command (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_batch::{
//!     config::{GeminiStageConfig, RemovalConfig, RemovalStageConfig},
//!     gemini::QuickAction,
//!     services::ConsoleObserver,
//!     BatchSession, ImageSource, QueuedItem,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let session = BatchSession::open(GeminiStageConfig::default(), RemovalStageConfig::default())?;
//! session.credentials().set("my-api-key")?;
//!
//! let bytes = tokio::fs::read("cat.png").await?;
//! let items = vec![QueuedItem::new(ImageSource::new("cat.png", "image/png", bytes), "cat.png")];
//!
//! let cancel = CancellationToken::new();
//! let observer = ConsoleObserver::new(false);
//!
//! let stage = session.gemini_stage(QuickAction::default())?;
//! let report = stage.process(items, &cancel, &observer).await?;
//! stage.send_to_removal(&report)?;
//!
//! let removal = session.removal_runner(RemovalConfig::default());
//! let report = removal.process_pending(&cancel, &observer).await?;
//! println!("{} image(s) processed", report.completed_count());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, file intake and progress bars
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log file output

pub mod config;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod handoff;
pub mod queue;
pub mod rate_limiter;
pub mod removal;
pub mod services;
pub mod session;
pub mod storage;
pub mod tracing_config;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod intake;

// Public API exports
pub use config::{GeminiStageConfig, ModelSize, OutputFormat, OutputType, RemovalConfig, RemovalStageConfig};
pub use credentials::CredentialSlot;
pub use error::{BatchError, Result};
pub use gemini::{GeminiHttpClient, GeminiImageProcessor, GeminiStage, QuickAction, VisionEditClient};
pub use handoff::HandoffStore;
pub use queue::{BatchQueueRunner, BatchReport, ItemProcessor, RunOutcome, RunState};
pub use rate_limiter::{Clock, ManualClock, RateLimiter, SystemClock};
pub use removal::{BackgroundRemovalRunner, BackgroundRemover, ExternalCommandRemover, RemovalProcessor};
pub use services::{ConsoleObserver, NoOpObserver, QueueObserver, TracingObserver};
pub use session::BatchSession;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::{DataUri, FileMetadata, HandoffRecord, ImageSource, ItemStatus, QueuedItem, StatusKind};

pub use tracing_config::{spans, TracingConfig, TracingFormat, TracingOutput};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
