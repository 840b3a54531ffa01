//! Core data types shared by both pipeline stages

use crate::error::{BatchError, Result};
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Minimal file metadata carried alongside an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original file name
    pub name: String,
    /// MIME type (e.g. `image/png`)
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
}

/// Immutable source image shared between the queue and its processors
///
/// Cloning is cheap; the pixel bytes are reference counted and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    data: Arc<[u8]>,
    file: FileMetadata,
}

impl ImageSource {
    /// Wrap raw image bytes with their file name and MIME type
    #[must_use]
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mime_type: M, data: Vec<u8>) -> Self {
        let file = FileMetadata {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
        };
        Self {
            data: Arc::from(data),
            file,
        }
    }

    /// Build a source from a data URI, keeping the supplied metadata name
    ///
    /// The MIME type is taken from the URI and the size from the decoded payload.
    ///
    /// # Errors
    /// - Payload is not valid base64
    pub fn from_data_uri(name: &str, uri: &DataUri) -> Result<Self> {
        Ok(Self::new(name, uri.mime_type(), uri.decode()?))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn file(&self) -> &FileMetadata {
        &self.file
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.file.name
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.file.mime_type
    }

    /// Encode the bytes as a self-contained data URI
    #[must_use]
    pub fn to_data_uri(&self) -> DataUri {
        DataUri::from_bytes(self.mime_type(), &self.data)
    }
}

/// A self-contained `data:<mime>;base64,<payload>` reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataUri {
    mime_type: String,
    data: String,
}

impl DataUri {
    /// Create from an already base64-encoded payload
    #[must_use]
    pub fn new<M: Into<String>, D: Into<String>>(mime_type: M, base64_data: D) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64_data.into(),
        }
    }

    /// Create by base64-encoding raw bytes
    #[must_use]
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self::new(mime_type, general_purpose::STANDARD.encode(bytes))
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload, without the `data:` header
    #[must_use]
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    /// Decode the payload back into bytes
    ///
    /// # Errors
    /// - Payload is not valid base64
    pub fn decode(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| BatchError::invalid_input(format!("Invalid base64 payload: {}", e)))
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

impl FromStr for DataUri {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("data:")
            .ok_or_else(|| BatchError::invalid_input("Data URI must start with 'data:'"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| BatchError::invalid_input("Data URI is missing the ',' separator"))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| BatchError::invalid_input("Only base64 data URIs are supported"))?;
        if mime_type.is_empty() {
            return Err(BatchError::invalid_input("Data URI has an empty MIME type"));
        }
        Ok(Self::new(mime_type, payload))
    }
}

impl TryFrom<String> for DataUri {
    type Error = BatchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DataUri> for String {
    fn from(value: DataUri) -> Self {
        value.to_string()
    }
}

/// Per-item status; terminal variants carry their outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Queued,
    Processing,
    Completed { result: DataUri },
    Error { message: String },
}

/// Fieldless view of [`ItemStatus`] for comparisons and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Queued,
    Processing,
    Completed,
    Error,
}

impl ItemStatus {
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Queued => StatusKind::Queued,
            Self::Processing => StatusKind::Processing,
            Self::Completed { .. } => StatusKind::Completed,
            Self::Error { .. } => StatusKind::Error,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// One image moving through a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    /// Identifier assigned at intake
    pub id: String,
    /// Original image, never mutated
    pub source: ImageSource,
    /// Display reference owned by the front-end
    pub preview: String,
    status: ItemStatus,
}

impl QueuedItem {
    /// Create a queued item with a fresh identifier
    #[must_use]
    pub fn new<P: Into<String>>(source: ImageSource, preview: P) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), source, preview)
    }

    /// Create a queued item with a known identifier
    #[must_use]
    pub fn with_id<I: Into<String>, P: Into<String>>(id: I, source: ImageSource, preview: P) -> Self {
        Self {
            id: id.into(),
            source,
            preview: preview.into(),
            status: ItemStatus::Queued,
        }
    }

    #[must_use]
    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    #[must_use]
    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    /// Result reference, present only once completed
    #[must_use]
    pub fn result(&self) -> Option<&DataUri> {
        match &self.status {
            ItemStatus::Completed { result } => Some(result),
            _ => None,
        }
    }

    /// Error message, present only once failed
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Put the item back into the queue at the start of a new run
    pub fn reset(&mut self) {
        self.status = ItemStatus::Queued;
    }

    /// `queued -> processing`
    ///
    /// # Errors
    /// - Item is not queued
    pub fn begin(&mut self) -> Result<()> {
        match self.status {
            ItemStatus::Queued => {
                self.status = ItemStatus::Processing;
                Ok(())
            },
            _ => Err(self.transition_error(StatusKind::Processing)),
        }
    }

    /// `processing -> completed`
    ///
    /// # Errors
    /// - Item is not processing
    pub fn complete(&mut self, result: DataUri) -> Result<()> {
        match self.status {
            ItemStatus::Processing => {
                self.status = ItemStatus::Completed { result };
                Ok(())
            },
            _ => Err(self.transition_error(StatusKind::Completed)),
        }
    }

    /// `processing -> error`
    ///
    /// # Errors
    /// - Item is not processing
    pub fn fail<S: Into<String>>(&mut self, message: S) -> Result<()> {
        match self.status {
            ItemStatus::Processing => {
                self.status = ItemStatus::Error {
                    message: message.into(),
                };
                Ok(())
            },
            _ => Err(self.transition_error(StatusKind::Error)),
        }
    }

    fn transition_error(&self, to: StatusKind) -> BatchError {
        BatchError::InvalidTransition(format!(
            "item {} cannot move from {} to {}",
            self.id,
            self.status.kind(),
            to
        ))
    }
}

/// Snapshot of a completed item handed from the Gemini stage to removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub id: String,
    pub preview: String,
    pub result: String,
    pub file: FileMetadata,
}

impl HandoffRecord {
    /// Snapshot a completed item; `None` for anything else
    #[must_use]
    pub fn from_completed(item: &QueuedItem) -> Option<Self> {
        item.result().map(|result| Self {
            id: item.id.clone(),
            preview: item.preview.clone(),
            result: result.to_string(),
            file: item.source.file().clone(),
        })
    }

    /// Rebuild a queued item whose source is this record's result image
    ///
    /// # Errors
    /// - `result` is not a base64 data URI
    pub fn to_queued_item(&self) -> Result<QueuedItem> {
        let uri: DataUri = self.result.parse().map_err(|e| {
            BatchError::invalid_input(format!("Hand-off record {} is unusable: {}", self.id, e))
        })?;
        let source = ImageSource::from_data_uri(&self.file.name, &uri)?;
        Ok(QueuedItem::with_id(self.id.clone(), source, self.preview.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source() -> ImageSource {
        ImageSource::new("cat.png", "image/png", vec![0x89, 0x50, 0x4E, 0x47])
    }

    #[test]
    fn test_data_uri_parse_and_display() {
        let uri: DataUri = "data:image/png;base64,iVBORw==".parse().unwrap();
        assert_eq!(uri.mime_type(), "image/png");
        assert_eq!(uri.base64_data(), "iVBORw==");
        assert_eq!(uri.to_string(), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_data_uri_rejects_malformed_input() {
        assert!("image/png;base64,abc".parse::<DataUri>().is_err());
        assert!("data:image/png;base64".parse::<DataUri>().is_err());
        assert!("data:image/png,abc".parse::<DataUri>().is_err());
        assert!("data:;base64,abc".parse::<DataUri>().is_err());
    }

    #[test]
    fn test_data_uri_decode() {
        let uri = DataUri::from_bytes("image/png", &[1, 2, 3, 4]);
        assert_eq!(uri.decode().unwrap(), vec![1, 2, 3, 4]);

        let bad = DataUri::new("image/png", "!!not base64!!");
        assert!(matches!(bad.decode(), Err(BatchError::InvalidInput(_))));
    }

    #[test]
    fn test_image_source_metadata() {
        let source = sample_source();
        assert_eq!(source.name(), "cat.png");
        assert_eq!(source.mime_type(), "image/png");
        assert_eq!(source.file().size, 4);
        assert_eq!(source.to_data_uri().decode().unwrap(), source.bytes());
    }

    #[test]
    fn test_item_status_machine() {
        let mut item = QueuedItem::new(sample_source(), "file:///cat.png");
        assert_eq!(item.kind(), StatusKind::Queued);
        assert!(item.result().is_none());

        item.begin().unwrap();
        assert_eq!(item.kind(), StatusKind::Processing);

        item.complete(DataUri::new("image/png", "AAAA")).unwrap();
        assert_eq!(item.kind(), StatusKind::Completed);
        assert!(item.result().is_some());
        assert!(item.error_message().is_none());
        assert!(item.status().is_terminal());

        // Terminal states are final
        assert!(matches!(item.begin(), Err(BatchError::InvalidTransition(_))));
        assert!(item.fail("late failure").is_err());
    }

    #[test]
    fn test_item_cannot_skip_processing() {
        let mut item = QueuedItem::new(sample_source(), "preview");
        assert!(item.complete(DataUri::new("image/png", "AAAA")).is_err());
        assert!(item.fail("nope").is_err());

        item.begin().unwrap();
        item.fail("remote down").unwrap();
        assert_eq!(item.error_message(), Some("remote down"));
        assert!(item.result().is_none());
    }

    #[test]
    fn test_handoff_record_serialization_shape() {
        let record = HandoffRecord {
            id: "abc123".to_string(),
            preview: "file:///tmp/cat.png".to_string(),
            result: "data:image/png;base64,AAAA".to_string(),
            file: FileMetadata {
                name: "cat.png".to_string(),
                mime_type: "image/png".to_string(),
                size: 42,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file"]["type"], "image/png");
        assert_eq!(json["file"]["size"], 42);
        assert_eq!(json["result"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_handoff_record_only_from_completed_items() {
        let mut item = QueuedItem::new(sample_source(), "preview");
        assert!(HandoffRecord::from_completed(&item).is_none());

        item.begin().unwrap();
        item.complete(DataUri::from_bytes("image/png", &[9, 9])).unwrap();
        let record = HandoffRecord::from_completed(&item).unwrap();
        assert_eq!(record.id, item.id);
        assert_eq!(record.file.name, "cat.png");

        let requeued = record.to_queued_item().unwrap();
        assert_eq!(requeued.id, item.id);
        assert_eq!(requeued.kind(), StatusKind::Queued);
        assert_eq!(requeued.source.bytes(), &[9, 9]);
    }
}
