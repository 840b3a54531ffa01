//! Output format and MIME type mapping
//!
//! Keeps the format/extension/MIME tables in one place so intake, the
//! removal processor and export agree on names.

use crate::config::OutputFormat;

/// MIME types accepted at intake, with their canonical extension
const SUPPORTED_INPUTS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
];

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Get the appropriate file extension for a given output format
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_batch::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
        }
    }

    /// MIME type of results encoded in `format`
    #[must_use]
    pub fn mime_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Warn when a format cannot carry the transparency removal produces
    pub fn validate_for_background_removal(format: OutputFormat) {
        if !Self::supports_transparency(format) {
            log::warn!(
                "Output format {:?} does not support transparency. Background removal results may appear with a solid background.",
                format
            );
        }
    }

    /// Intake MIME type for a file extension (case-insensitive)
    #[must_use]
    pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
        let ext = extension.to_ascii_lowercase();
        SUPPORTED_INPUTS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, mime)| *mime)
    }

    /// Canonical file extension for an image MIME type
    #[must_use]
    pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
        SUPPORTED_INPUTS
            .iter()
            .find(|(_, mime)| mime.eq_ignore_ascii_case(mime_type))
            .map(|(ext, _)| *ext)
    }

    /// Whether intake accepts files with this MIME type
    #[must_use]
    pub fn is_supported_mime(mime_type: &str) -> bool {
        Self::extension_for_mime(mime_type).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_and_mime_agree() {
        for format in [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::WebP] {
            let ext = OutputFormatHandler::get_extension(format);
            assert_eq!(
                OutputFormatHandler::mime_for_extension(ext),
                Some(OutputFormatHandler::mime_type(format))
            );
        }
    }

    #[test]
    fn test_supports_transparency() {
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::WebP));
        assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Jpeg));
    }

    #[test]
    fn test_mime_for_extension_case_insensitive() {
        assert_eq!(OutputFormatHandler::mime_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(OutputFormatHandler::mime_for_extension("jpeg"), Some("image/jpeg"));
        assert_eq!(OutputFormatHandler::mime_for_extension("gif"), None);
        assert_eq!(OutputFormatHandler::mime_for_extension(""), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(OutputFormatHandler::extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(OutputFormatHandler::extension_for_mime("IMAGE/PNG"), Some("png"));
        assert_eq!(OutputFormatHandler::extension_for_mime("image/gif"), None);
        assert!(OutputFormatHandler::is_supported_mime("image/webp"));
        assert!(!OutputFormatHandler::is_supported_mime("text/plain"));
    }
}
