//! Hand-off of completed generative-edit results to the removal stage
//!
//! At most one pending set exists; publishing replaces it. The removal
//! stage reads it without consuming, and discards it once every record has
//! been processed or the user rejects it.

use crate::error::{BatchError, Result};
use crate::storage::KeyValueStore;
use crate::tracing_config::spans;
use crate::types::{HandoffRecord, QueuedItem};
use std::sync::Arc;
use tracing::{debug, info};

/// Storage key holding the pending hand-off
pub const HANDOFF_KEY: &str = "gemini_processed_images";

/// Persisted producer/consumer bridge between the two stages
#[derive(Clone)]
pub struct HandoffStore {
    store: Arc<dyn KeyValueStore>,
}

impl HandoffStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Replace any pending hand-off with `records`
    ///
    /// # Errors
    /// - Serialization or storage failure
    pub fn publish(&self, records: &[HandoffRecord]) -> Result<()> {
        let _span = spans::handoff("publish").entered();
        let payload = serde_json::to_string(records)?;
        self.store.set(HANDOFF_KEY, &payload)?;
        info!(records = records.len(), "Published hand-off");
        Ok(())
    }

    /// Publish only the completed items of a finished batch
    ///
    /// Returns how many records were published.
    ///
    /// # Errors
    /// - `NoCompletedItems` when nothing completed; any pending hand-off is left untouched
    /// - Serialization or storage failure
    pub fn publish_completed<'a, I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a QueuedItem>,
    {
        let records: Vec<HandoffRecord> = items
            .into_iter()
            .filter_map(HandoffRecord::from_completed)
            .collect();
        if records.is_empty() {
            return Err(BatchError::NoCompletedItems);
        }
        self.publish(&records)?;
        Ok(records.len())
    }

    /// Pending records, without consuming them
    ///
    /// A missing or empty value yields an empty list.
    ///
    /// # Errors
    /// - Stored value is not a valid record list (`Storage`)
    /// - Storage read failure
    pub fn take_pending(&self) -> Result<Vec<HandoffRecord>> {
        let _span = spans::handoff("read").entered();
        let Some(raw) = self.store.get(HANDOFF_KEY)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<HandoffRecord> = serde_json::from_str(&raw)
            .map_err(|e| BatchError::storage(format!("Corrupt hand-off payload: {}", e)))?;
        debug!(records = records.len(), "Read pending hand-off");
        Ok(records)
    }

    /// Whether a non-empty hand-off is waiting
    ///
    /// # Errors
    /// - Same as [`take_pending`](Self::take_pending)
    pub fn has_pending(&self) -> Result<bool> {
        Ok(!self.take_pending()?.is_empty())
    }

    /// Drop the pending hand-off
    ///
    /// # Errors
    /// - Storage failure
    pub fn discard(&self) -> Result<()> {
        let _span = spans::handoff("discard").entered();
        self.store.remove(HANDOFF_KEY)?;
        info!("Discarded hand-off");
        Ok(())
    }
}

impl std::fmt::Debug for HandoffStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffStore").field("key", &HANDOFF_KEY).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{DataUri, ImageSource};

    fn item(name: &str, completed: bool) -> QueuedItem {
        let mut item = QueuedItem::new(ImageSource::new(name, "image/png", vec![1, 2, 3]), "preview");
        item.begin().unwrap();
        if completed {
            item.complete(DataUri::from_bytes("image/png", &[7, 7])).unwrap();
        } else {
            item.fail("remote down").unwrap();
        }
        item
    }

    fn store() -> (HandoffStore, Arc<MemoryStore>) {
        let backing = Arc::new(MemoryStore::new());
        (HandoffStore::new(backing.clone()), backing)
    }

    #[test]
    fn test_empty_when_nothing_published() {
        let (handoff, _) = store();
        assert!(handoff.take_pending().unwrap().is_empty());
        assert!(!handoff.has_pending().unwrap());
    }

    #[test]
    fn test_publish_completed_filters_failures() {
        let (handoff, _) = store();
        let items = vec![item("a.png", true), item("b.png", false), item("c.png", true)];

        let published = handoff.publish_completed(&items).unwrap();
        assert_eq!(published, 2);

        let pending = handoff.take_pending().unwrap();
        let names: Vec<_> = pending.iter().map(|r| r.file.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "c.png"]);

        // Reading does not consume
        assert_eq!(handoff.take_pending().unwrap().len(), 2);
    }

    #[test]
    fn test_publish_completed_requires_a_success() {
        let (handoff, _) = store();
        handoff.publish_completed(&[item("keep.png", true)]).unwrap();

        let err = handoff.publish_completed(&[item("x.png", false)]).unwrap_err();
        assert!(matches!(err, BatchError::NoCompletedItems));
        // Prior hand-off untouched
        assert_eq!(handoff.take_pending().unwrap().len(), 1);
    }

    #[test]
    fn test_publish_replaces_previous_set() {
        let (handoff, _) = store();
        handoff.publish_completed(&[item("a.png", true), item("b.png", true)]).unwrap();
        handoff.publish_completed(&[item("c.png", true)]).unwrap();

        let pending = handoff.take_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file.name, "c.png");
    }

    #[test]
    fn test_discard_clears() {
        let (handoff, backing) = store();
        handoff.publish_completed(&[item("a.png", true)]).unwrap();
        handoff.discard().unwrap();

        assert!(handoff.take_pending().unwrap().is_empty());
        assert_eq!(backing.get(HANDOFF_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_payload_is_storage_error() {
        let (handoff, backing) = store();
        backing.set(HANDOFF_KEY, "{not a list").unwrap();
        assert!(matches!(handoff.take_pending(), Err(BatchError::Storage(_))));

        backing.set(HANDOFF_KEY, "   ").unwrap();
        assert!(handoff.take_pending().unwrap().is_empty());
    }
}
