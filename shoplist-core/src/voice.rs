//! Mapping spoken answers onto review events.

use crate::catalog::CatalogEntry;
use crate::review::Event;

/// Words that count as "yes, add it" when heard anywhere in an answer.
pub const DEFAULT_AFFIRMATIVES: &[&str] = &["yes", "yeah", "yep", "sure", "add"];

/// How spoken answers become events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceIntents {
    affirmatives: Vec<String>,
    default_quantity: u32,
}

impl Default for VoiceIntents {
    fn default() -> Self {
        Self::new(DEFAULT_AFFIRMATIVES.iter().map(|w| w.to_string()), 1)
    }
}

impl VoiceIntents {
    pub fn new(affirmatives: impl IntoIterator<Item = String>, default_quantity: u32) -> Self {
        Self {
            affirmatives: affirmatives
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
            default_quantity: default_quantity.max(1),
        }
    }

    pub fn affirmatives(&self) -> &[String] {
        &self.affirmatives
    }

    /// Returns true if any whole word of `utterance` is an affirmative.
    pub fn is_affirmative(&self, utterance: &str) -> bool {
        utterance
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .any(|word| {
                let word = word.to_lowercase();
                self.affirmatives.iter().any(|a| *a == word)
            })
    }

    /// Event for an answer about `entry`.
    ///
    /// Affirmative answers confirm the default quantity, capped at the
    /// item's maximum. Anything else skips.
    pub fn interpret(&self, utterance: &str, entry: &CatalogEntry) -> Event {
        if self.is_affirmative(utterance) {
            Event::Confirm {
                quantity: Some(self.default_quantity.min(entry.max_quantity)),
            }
        } else {
            Event::Skip
        }
    }

    /// The question read out for `entry`.
    pub fn prompt(entry: &CatalogEntry) -> String {
        format!(
            "Do you need {}? You can have up to {}.",
            entry.name, entry.max_quantity
        )
    }
}
