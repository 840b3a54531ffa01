//! Batch pipeline CLI tool
//!
//! Command-line front-end for the generative-edit and background-removal
//! stages and the persisted state they share.

use super::config::CliConfigBuilder;
use super::progress::ProgressBarObserver;
use crate::{
    credentials::mask_credential,
    gemini::QuickAction,
    intake::{self, IntakeOptions},
    queue::{BatchReport, RunOutcome},
    services::{CompositeObserver, ConsoleObserver, ImageIOService, QueueObserver, TracingObserver},
    storage::{FileStore, KeyValueStore},
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Batch generative editing and background removal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-batch")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use custom directory for the stored API key and hand-off
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Draw a progress bar instead of per-item log lines
    #[arg(long, global = true)]
    pub progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the stored Gemini API key
    Credential {
        #[command(subcommand)]
        action: CredentialCommand,
    },
    /// List the available edit actions
    Actions,
    /// Apply a generative edit to a batch of images
    Gemini(GeminiArgs),
    /// Inspect or discard images waiting for background removal
    Handoff {
        #[command(subcommand)]
        action: HandoffCommand,
    },
    /// Remove backgrounds from the images waiting in the hand-off
    Remove(RemoveArgs),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CredentialCommand {
    /// Store an API key (read from stdin when omitted)
    Set { key: Option<String> },
    /// Forget the stored API key
    Clear,
    /// Show the stored API key, masked
    Show,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffCommand {
    /// List the pending images
    Show,
    /// Drop the pending images without processing them
    Discard,
}

#[derive(Args, Debug, Clone)]
pub struct GeminiArgs {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Edit action id (see `actions`)
    #[arg(short, long, default_value = "remove-bg")]
    pub action: String,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Maximum number of images in the batch [default: 5]
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Directory for the edited images
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Hand completed images to the background-removal stage
    #[arg(long)]
    pub send: bool,

    /// Gemini model name
    #[arg(long)]
    pub model: Option<String>,

    /// API base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Pause between images in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Model size
    #[arg(short, long, value_enum, default_value_t = CliModelSize::Medium)]
    pub model: CliModelSize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Output quality (0.0-1.0)
    #[arg(short, long, default_value_t = 0.8)]
    pub quality: f32,

    /// Which layer to write out
    #[arg(long = "type", value_enum, default_value_t = CliOutputType::Foreground)]
    pub output_type: CliOutputType,

    /// Directory for the processed images
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Background remover executable
    #[arg(long)]
    pub command: Option<String>,

    /// Pause between images in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliModelSize {
    Large,
    Medium,
    Small,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputType {
    Foreground,
    Background,
    Mask,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
    debug!(verbosity = cli.verbose, "Starting bgremove-batch");

    match &cli.command {
        Command::Credential { action } => run_credential(&cli, action),
        Command::Actions => {
            list_actions();
            Ok(())
        },
        Command::Gemini(args) => run_gemini(&cli, args).await,
        Command::Handoff { action } => run_handoff(&cli, *action),
        Command::Remove(args) => run_remove(&cli, args).await,
    }
}

fn open_store(cli: &Cli) -> Result<Arc<dyn KeyValueStore>> {
    let store = match &cli.data_dir {
        Some(dir) => FileStore::with_custom_dir(dir),
        None => FileStore::new(),
    }
    .context("Failed to open data directory")?;
    debug!(dir = %store.dir().display(), "Using data directory");
    Ok(Arc::new(store))
}

fn run_credential(cli: &Cli, action: &CredentialCommand) -> Result<()> {
    let session = CliConfigBuilder::session(open_store(cli)?, None, None)?;
    let credentials = session.credentials();

    match action {
        CredentialCommand::Set { key } => {
            let key = match key {
                Some(key) => key.clone(),
                None => read_key_from_stdin()?,
            };
            credentials.set(&key).context("Failed to store API key")?;
            if credentials.is_configured()? {
                info!("🔑 API key saved");
            } else {
                warn!("Empty key given; stored API key cleared");
            }
        },
        CredentialCommand::Clear => {
            credentials.clear().context("Failed to clear API key")?;
            info!("API key cleared");
        },
        CredentialCommand::Show => match credentials.get()? {
            Some(key) => println!("{}", mask_credential(&key)),
            None => println!("No API key configured"),
        },
    }
    Ok(())
}

fn read_key_from_stdin() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read API key from stdin")?;
    Ok(line.trim().to_string())
}

fn list_actions() {
    println!("Available actions:");
    for action in QuickAction::all() {
        println!("  {:<10} {} - {}", action.id, action.label, action.description);
    }
}

fn run_handoff(cli: &Cli, action: HandoffCommand) -> Result<()> {
    let session = CliConfigBuilder::session(open_store(cli)?, None, None)?;
    let handoff = session.handoff();

    match action {
        HandoffCommand::Show => {
            let pending = handoff.take_pending().context("Failed to read hand-off")?;
            if pending.is_empty() {
                println!("No images waiting for background removal");
            }
            for record in &pending {
                println!("  {}  {}", record.id, record.file.name);
            }
        },
        HandoffCommand::Discard => {
            handoff.discard().context("Failed to discard hand-off")?;
            info!("Hand-off discarded");
        },
    }
    Ok(())
}

async fn run_gemini(cli: &Cli, args: &GeminiArgs) -> Result<()> {
    let session = CliConfigBuilder::session(open_store(cli)?, Some(args), None)?;
    let action = QuickAction::find(&args.action)?;

    let options = IntakeOptions {
        recursive: args.recursive,
        pattern: args.pattern.clone(),
        max_files: args.max_files.unwrap_or(session.gemini_config().max_batch_size),
    };
    let items = intake::intake(&args.inputs, &options).await?;
    info!("🎨 Action: {}", action.label);

    let stage = session.gemini_stage(action)?;
    let cancel = cancel_on_ctrl_c();
    let observers = StageObservers::new(cli, "gemini");
    let report = stage.process(items, &cancel, &observers.composite()).await?;

    if let Some(dir) = &args.output {
        prepare_output_dir(dir).await?;
        ImageIOService::export_results(&report.items, dir, |item| {
            ImageIOService::gemini_output_name(item.source.name())
        })
        .await?;
    }

    if args.send {
        let sent = stage.send_to_removal(&report).context("Failed to hand off results")?;
        info!("📤 Sent {} image(s) to background removal", sent);
    }

    finish(&report)
}

async fn run_remove(cli: &Cli, args: &RemoveArgs) -> Result<()> {
    let session = CliConfigBuilder::session(open_store(cli)?, None, Some(args))?;
    let config = CliConfigBuilder::removal_config(args).context("Invalid removal options")?;

    let runner = session.removal_runner(config);
    let cancel = cancel_on_ctrl_c();
    let observers = StageObservers::new(cli, "removal");
    let report = runner.process_pending(&cancel, &observers.composite()).await?;

    if let Some(dir) = &args.output {
        prepare_output_dir(dir).await?;
        ImageIOService::export_results(&report.items, dir, |item| {
            ImageIOService::removal_output_name(item.source.name(), config.output.format)
        })
        .await?;
    }

    finish(&report)
}

/// Console or progress-bar front, plus structured events when verbose
struct StageObservers {
    use_bar: bool,
    verbose: bool,
    console: ConsoleObserver,
    bar: ProgressBarObserver,
    tracing: TracingObserver,
}

impl StageObservers {
    fn new(cli: &Cli, stage: &'static str) -> Self {
        Self {
            use_bar: cli.progress,
            verbose: cli.verbose > 0,
            console: ConsoleObserver::new(cli.verbose > 0),
            bar: ProgressBarObserver::new(),
            tracing: TracingObserver::new(stage),
        }
    }

    fn composite(&self) -> CompositeObserver<'_> {
        let front: &dyn QueueObserver = if self.use_bar { &self.bar } else { &self.console };
        let observer = CompositeObserver::new().with(front);
        if self.verbose {
            observer.with(&self.tracing)
        } else {
            observer
        }
    }
}

/// Shown on Ctrl-C; the in-flight image is dropped, not finished
const CANCEL_NOTICE: &str = "Cancelling; aborting the current image...";

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("{}", CANCEL_NOTICE);
            token.cancel();
        }
    });
    cancel
}

async fn prepare_output_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

fn finish(report: &BatchReport) -> Result<()> {
    if report.outcome == RunOutcome::Cancelled {
        warn!("Stopped early; remaining images were not processed");
        return Ok(());
    }
    if report.completed_count() == 0 {
        anyhow::bail!("No images were processed successfully");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_notice_says_current_image_is_aborted() {
        assert!(CANCEL_NOTICE.contains("aborting the current image"));
        assert!(!CANCEL_NOTICE.contains("after the current image"));
    }

    #[test]
    fn test_cancelled_report_is_not_an_error() {
        let report = BatchReport {
            items: Vec::new(),
            outcome: RunOutcome::Cancelled,
            elapsed: std::time::Duration::ZERO,
        };
        assert!(finish(&report).is_ok());
    }
}
