//! Turning file-system inputs into queued items

use crate::error::{BatchError, Result};
use crate::services::ImageIOService;
use crate::types::QueuedItem;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How inputs are expanded into a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Glob matched against file names found in directories (e.g. `*.png`)
    pub pattern: Option<String>,
    /// Batch size ceiling; extra files are dropped after sorting
    pub max_files: usize,
}

impl Default for IntakeOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            pattern: None,
            max_files: 5,
        }
    }
}

/// Expand files and directories into a sorted list of supported image paths
///
/// Explicit files with an unsupported extension are skipped with a warning.
///
/// # Errors
/// - An input does not exist
/// - Directory traversal failed
/// - Invalid glob pattern
pub fn collect_image_paths(inputs: &[PathBuf], options: &IntakeOptions) -> Result<Vec<PathBuf>> {
    let pattern = options
        .pattern
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| BatchError::invalid_input(format!("Invalid pattern: {}", e)))?;

    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            if ImageIOService::is_supported_format(input) {
                files.push(input.clone());
            } else {
                warn!("Skipping unsupported file: {}", input.display());
            }
        } else if input.is_dir() {
            files.extend(find_image_files(input, options.recursive, pattern.as_ref())?);
        } else {
            return Err(BatchError::invalid_input(format!(
                "Input path does not exist or is not accessible: {}",
                input.display()
            )));
        }
    }

    // Alphanumeric order keeps runs reproducible
    files.sort();
    files.dedup();

    if files.len() > options.max_files {
        warn!(
            found = files.len(),
            max = options.max_files,
            "Too many images; only the first {} will be processed",
            options.max_files
        );
        files.truncate(options.max_files);
    }
    Ok(files)
}

/// Load paths into fresh queued items, in order
///
/// # Errors
/// - A file cannot be read or is not a supported image
pub async fn load_items(paths: &[PathBuf]) -> Result<Vec<QueuedItem>> {
    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let source = ImageIOService::load_source(path).await?;
        items.push(QueuedItem::new(source, preview_uri(path)));
    }
    info!("Loaded {} image(s)", items.len());
    Ok(items)
}

/// Collect and load in one step
///
/// # Errors
/// - Any error from [`collect_image_paths`] or [`load_items`]
pub async fn intake(inputs: &[PathBuf], options: &IntakeOptions) -> Result<Vec<QueuedItem>> {
    let paths = collect_image_paths(inputs, options)?;
    load_items(&paths).await
}

/// `file://` URI of a path, absolute when it can be resolved
#[must_use]
pub fn preview_uri(path: &Path) -> String {
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&glob::Pattern>) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.map_err(|e| {
            BatchError::invalid_input(format!("Failed to read directory {}: {}", dir.display(), e))
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && ImageIOService::is_supported_format(path)
            && matches_pattern(path, pattern)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    match pattern {
        Some(pattern) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name)),
        None => true,
    }
}
