//! Predefined edit prompts

use crate::error::{BatchError, Result};
use std::fmt;
use std::str::FromStr;

/// A named, reusable edit instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub id: &'static str,
    pub label: &'static str,
    pub prompt: &'static str,
    pub description: &'static str,
}

/// Action used when none is chosen
pub const REMOVE_BACKGROUND: QuickAction = QuickAction {
    id: "remove-bg",
    label: "Remove Background",
    prompt: "Please remove the background and make it completely white",
    description: "Removes the background and replaces it with white",
};

/// Every available action, in display order
pub const QUICK_ACTIONS: &[QuickAction] = &[
    REMOVE_BACKGROUND,
    QuickAction {
        id: "enhance",
        label: "Enhance Quality",
        prompt: "Please enhance this image to make it more professional and high quality",
        description: "Improves overall image quality",
    },
    QuickAction {
        id: "cartoon",
        label: "Cartoon Style",
        prompt: "Convert this image into a cartoon style illustration",
        description: "Converts the image to cartoon style",
    },
    QuickAction {
        id: "vibrant",
        label: "Make Vibrant",
        prompt: "Make the colors more vibrant and eye-catching",
        description: "Enhances color vibrancy",
    },
];

impl QuickAction {
    /// Look up an action by id
    ///
    /// # Errors
    /// - Unknown id (`InvalidConfig`, listing the valid ids)
    pub fn find(id: &str) -> Result<Self> {
        QUICK_ACTIONS
            .iter()
            .find(|action| action.id == id)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = QUICK_ACTIONS.iter().map(|a| a.id).collect();
                BatchError::invalid_config(format!(
                    "Unknown action '{}'. Available actions: {}",
                    id,
                    known.join(", ")
                ))
            })
    }

    /// All actions, in display order
    #[must_use]
    pub fn all() -> &'static [QuickAction] {
        QUICK_ACTIONS
    }
}

impl Default for QuickAction {
    fn default() -> Self {
        REMOVE_BACKGROUND
    }
}

impl FromStr for QuickAction {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::find(s)
    }
}

impl fmt::Display for QuickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}
