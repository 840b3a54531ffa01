//! Persisted API credential

use crate::error::Result;
use crate::storage::KeyValueStore;
use std::sync::Arc;

/// Storage key holding the generative API credential
pub const CREDENTIAL_KEY: &str = "gemini_api_key";

/// Single persisted credential string
///
/// Only presence is checked; whether the remote accepts the key is found
/// out on the first call.
#[derive(Clone)]
pub struct CredentialSlot {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialSlot {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Current credential, `None` when unset or blank
    ///
    /// # Errors
    /// - Storage read failure
    pub fn get(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(CREDENTIAL_KEY)?
            .filter(|value| !value.trim().is_empty()))
    }

    /// Store a credential; an empty value clears the slot
    ///
    /// # Errors
    /// - Storage failure
    pub fn set(&self, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return self.clear();
        }
        self.store.set(CREDENTIAL_KEY, value)?;
        tracing::info!("API key saved");
        Ok(())
    }

    /// Remove the stored credential
    ///
    /// # Errors
    /// - Storage failure
    pub fn clear(&self) -> Result<()> {
        self.store.remove(CREDENTIAL_KEY)?;
        tracing::info!("API key cleared");
        Ok(())
    }

    /// Whether a credential is present
    ///
    /// # Errors
    /// - Storage read failure
    pub fn is_configured(&self) -> Result<bool> {
        Ok(self.get()?.is_some())
    }
}

impl std::fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret
        f.debug_struct("CredentialSlot").field("key", &CREDENTIAL_KEY).finish()
    }
}

/// Mask a credential for display, keeping the last four characters
#[must_use]
pub fn mask_credential(value: &str) -> String {
    let len = value.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let visible: String = value.chars().skip(len - 4).collect();
    format!("{}{}", "*".repeat(len - 4), visible)
}
