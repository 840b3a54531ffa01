//! Image file input/output service
//!
//! Reading sources from disk and writing results back out, kept apart from
//! the queue so both stages and the CLI share the same naming rules.

use crate::{
    config::OutputFormat,
    error::{BatchError, Result},
    services::OutputFormatHandler,
    types::{DataUri, ImageSource, QueuedItem},
};
use std::path::{Path, PathBuf};

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(OutputFormatHandler::mime_for_extension)
            .is_some()
    }

    /// Determine the MIME type of image bytes
    ///
    /// Content sniffing wins; the extension is only consulted when the bytes
    /// are not recognized.
    ///
    /// # Errors
    /// - Neither the content nor the extension is a supported image type
    pub fn detect_mime_type(bytes: &[u8], path: &Path) -> Result<&'static str> {
        let sniffed = image::guess_format(bytes).ok().and_then(|format| match format {
            image::ImageFormat::Png => Some("image/png"),
            image::ImageFormat::Jpeg => Some("image/jpeg"),
            image::ImageFormat::WebP => Some("image/webp"),
            _ => None,
        });
        if let Some(mime) = sniffed {
            return Ok(mime);
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(OutputFormatHandler::mime_for_extension)
            .ok_or_else(|| {
                BatchError::invalid_input(format!(
                    "Unsupported image type: {} (expected PNG, JPEG or WebP)",
                    path.display()
                ))
            })
    }

    /// Read an image file into an [`ImageSource`]
    ///
    /// # Errors
    /// - File cannot be read
    /// - Not a supported image type
    pub async fn load_source<P: AsRef<Path>>(path: P) -> Result<ImageSource> {
        let path_ref = path.as_ref();
        let bytes = tokio::fs::read(path_ref)
            .await
            .map_err(|e| BatchError::file_io_error("read image", path_ref, &e))?;
        let mime_type = Self::detect_mime_type(&bytes, path_ref)?;
        let name = path_ref
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(ImageSource::new(name, mime_type, bytes))
    }

    /// Write a data URI's decoded bytes to `path`, creating parent directories
    ///
    /// # Errors
    /// - Payload is not valid base64
    /// - Directory creation or write failed
    pub async fn save_data_uri<P: AsRef<Path>>(uri: &DataUri, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BatchError::file_io_error("create output directory", parent, &e))?;
        }

        let bytes = uri.decode()?;
        tokio::fs::write(path_ref, bytes)
            .await
            .map_err(|e| BatchError::file_io_error("write result", path_ref, &e))
    }

    /// Output file name for a generative-edit result
    #[must_use]
    pub fn gemini_output_name(source_name: &str) -> String {
        format!("gemini-processed-{}", source_name)
    }

    /// Output file name for a background-removal result
    #[must_use]
    pub fn removal_output_name(source_name: &str, format: OutputFormat) -> String {
        let stem = Path::new(source_name)
            .file_stem()
            .map_or_else(|| source_name.to_string(), |s| s.to_string_lossy().into_owned());
        format!("processed-{}.{}", stem, OutputFormatHandler::get_extension(format))
    }

    /// Write every completed item's result into `dir`
    ///
    /// Items without a result are skipped. Returns the written paths in
    /// item order.
    ///
    /// # Errors
    /// - Any write failure (earlier files stay on disk)
    pub async fn export_results<'a, I, F>(items: I, dir: &Path, name_for: F) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = &'a QueuedItem>,
        F: Fn(&QueuedItem) -> String,
    {
        let mut written = Vec::new();
        for item in items {
            let Some(result) = item.result() else {
                continue;
            };
            let path = dir.join(name_for(item));
            Self::save_data_uri(result, &path).await?;
            log::info!("💾 Saved {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}
