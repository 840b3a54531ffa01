//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CliModelSize, CliOutputFormat, CliOutputType, GeminiArgs, RemoveArgs};
use crate::{
    config::{GeminiStageConfig, ModelSize, OutputFormat, OutputType, RemovalConfig, RemovalStageConfig},
    session::BatchSession,
    storage::KeyValueStore,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Convert CLI arguments to stage configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Session for a subcommand; stage overrides apply when given
    pub(crate) fn session(
        store: Arc<dyn KeyValueStore>,
        gemini: Option<&GeminiArgs>,
        removal: Option<&RemoveArgs>,
    ) -> Result<BatchSession> {
        let gemini = gemini.map_or_else(|| Ok(GeminiStageConfig::default()), Self::gemini_stage_config)?;
        let removal = removal.map_or_else(RemovalStageConfig::default, Self::removal_stage_config);
        BatchSession::with_store(store, gemini, removal).context("Invalid stage configuration")
    }

    /// Build the generative-edit stage settings
    pub(crate) fn gemini_stage_config(args: &GeminiArgs) -> Result<GeminiStageConfig> {
        let defaults = GeminiStageConfig::default();
        let mut builder = GeminiStageConfig::builder();

        if let Some(model) = &args.model {
            builder = builder.model(model);
        }
        if let Some(base_url) = &args.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(delay) = args.delay_ms {
            builder = builder.inter_item_delay(Duration::from_millis(delay));
        }
        // A larger --max-files raises the batch ceiling with it
        if let Some(max_files) = args.max_files {
            builder = builder.max_batch_size(max_files.max(defaults.max_batch_size));
        }

        builder.build().context("Invalid Gemini options")
    }

    /// Build the removal stage settings
    pub(crate) fn removal_stage_config(args: &RemoveArgs) -> RemovalStageConfig {
        let defaults = RemovalStageConfig::default();
        RemovalStageConfig {
            inter_item_delay: args
                .delay_ms
                .map_or(defaults.inter_item_delay, Duration::from_millis),
            remover_command: args.command.clone().unwrap_or(defaults.remover_command),
        }
    }

    /// Build the per-image removal settings
    pub(crate) fn removal_config(args: &RemoveArgs) -> Result<RemovalConfig> {
        Ok(RemovalConfig::builder()
            .model(args.model.into())
            .format(args.format.into())
            .quality(args.quality)
            .output_type(args.output_type.into())
            .build()?)
    }
}

impl From<CliModelSize> for ModelSize {
    fn from(size: CliModelSize) -> Self {
        match size {
            CliModelSize::Large => Self::Large,
            CliModelSize::Medium => Self::Medium,
            CliModelSize::Small => Self::Small,
        }
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Webp => Self::WebP,
        }
    }
}

impl From<CliOutputType> for OutputType {
    fn from(output_type: CliOutputType) -> Self {
        match output_type {
            CliOutputType::Foreground => Self::Foreground,
            CliOutputType::Background => Self::Background,
            CliOutputType::Mask => Self::Mask,
        }
    }
}
