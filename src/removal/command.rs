//! Background remover backed by an external command-line tool

use super::BackgroundRemover;
use crate::config::{ModelSize, OutputFormat, OutputType, RemovalConfig};
use crate::error::{BatchError, Result};
use crate::services::OutputFormatHandler;
use crate::types::ImageSource;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Runs `<program> <input> --output <file> --format <fmt> --variant <v> ...`
///
/// Each call gets its own temporary directory; the child is killed if the
/// call is dropped (e.g. on cancellation).
#[derive(Debug, Clone)]
pub struct ExternalCommandRemover {
    program: OsString,
}

impl ExternalCommandRemover {
    #[must_use]
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Model precision variant for a model size
    ///
    /// Only fp32 and fp16 variants ship, so small and medium share fp16.
    #[must_use]
    pub fn variant_for(model: ModelSize) -> &'static str {
        match model {
            ModelSize::Large => "fp32",
            ModelSize::Medium | ModelSize::Small => "fp16",
        }
    }

    /// Command-line arguments for one invocation
    #[must_use]
    pub fn build_args(input: &Path, output: &Path, config: &RemovalConfig) -> Vec<OsString> {
        let format = match config.output.format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::WebP => "webp",
        };
        let quality = config.quality_percent().to_string();

        vec![
            input.as_os_str().to_owned(),
            "--output".into(),
            output.as_os_str().to_owned(),
            "--format".into(),
            format.into(),
            "--variant".into(),
            Self::variant_for(config.model).into(),
            "--jpeg-quality".into(),
            quality.clone().into(),
            "--webp-quality".into(),
            quality.into(),
        ]
    }
}

impl Default for ExternalCommandRemover {
    fn default() -> Self {
        Self::new("imgly-bgremove")
    }
}

#[async_trait]
impl BackgroundRemover for ExternalCommandRemover {
    #[instrument(skip_all, fields(file = %source.name(), model = %config.model))]
    async fn remove_background(&self, source: &ImageSource, config: &RemovalConfig) -> Result<Vec<u8>> {
        if config.output.output_type != OutputType::Foreground {
            warn!(
                output_type = ?config.output.output_type,
                "External remover only produces foreground cut-outs; ignoring output type"
            );
        }

        let workdir = tempfile::tempdir()
            .map_err(|e| BatchError::remote(format!("Failed to create working directory: {}", e)))?;
        let input_ext = OutputFormatHandler::extension_for_mime(source.mime_type()).unwrap_or("png");
        let input = workdir.path().join(format!("input.{}", input_ext));
        let output = workdir.path().join(format!(
            "output.{}",
            OutputFormatHandler::get_extension(config.output.format)
        ));

        tokio::fs::write(&input, source.bytes())
            .await
            .map_err(|e| BatchError::file_io_error("write remover input", &input, &e))?;

        let args = Self::build_args(&input, &output, config);
        debug!(program = ?self.program, ?args, "Running background remover");

        let result = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BatchError::remote(format!(
                    "Failed to run {}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(BatchError::remote(format!(
                "{} exited with {}: {}",
                self.program.to_string_lossy(),
                result.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(&output)
            .await
            .map_err(|e| BatchError::file_io_error("read remover output", &output, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_mapping() {
        assert_eq!(ExternalCommandRemover::variant_for(ModelSize::Large), "fp32");
        assert_eq!(ExternalCommandRemover::variant_for(ModelSize::Medium), "fp16");
        assert_eq!(ExternalCommandRemover::variant_for(ModelSize::Small), "fp16");
    }

    #[test]
    fn test_build_args() {
        let config = RemovalConfig::builder()
            .model(ModelSize::Large)
            .format(OutputFormat::Jpeg)
            .quality(0.9)
            .build()
            .unwrap();
        let args = ExternalCommandRemover::build_args(Path::new("/tmp/in.png"), Path::new("/tmp/out.jpg"), &config);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "/tmp/in.png",
                "--output",
                "/tmp/out.jpg",
                "--format",
                "jpeg",
                "--variant",
                "fp32",
                "--jpeg-quality",
                "90",
                "--webp-quality",
                "90"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_remote_error() {
        let remover = ExternalCommandRemover::new("definitely-not-a-real-bgremove-binary");
        let source = ImageSource::new("cat.png", "image/png", vec![1, 2, 3]);
        let err = remover
            .remove_background(&source, &RemovalConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Remote(_)));
        assert!(err.to_string().contains("definitely-not-a-real-bgremove-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_reports_status() {
        let remover = ExternalCommandRemover::new("false");
        let source = ImageSource::new("cat.png", "image/png", vec![1, 2, 3]);
        let err = remover
            .remove_background(&source, &RemovalConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
