//! Rendering contract for the review page.
//!
//! The view is recomputed from the session after every transition. The
//! presentation layer never looks at the queue directly.

use serde::Serialize;

use super::state::{ReviewSession, Selection};

/// Prompt shown once nothing is left to review.
pub const ALL_REVIEWED_PROMPT: &str = "All items reviewed.";

/// Everything the page needs to draw the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewView {
    /// "Item: {name} (Max: {max})", or [`ALL_REVIEWED_PROMPT`].
    pub prompt: String,
    /// Name of the item being asked about.
    pub current_item: Option<String>,
    /// Values for the quantity picker; empty when the review is finished.
    pub options: Vec<u32>,
    /// Confirm and skip are disabled exactly when the queue is empty.
    pub controls_disabled: bool,
    pub selections: Vec<Selection>,
    /// Items still pending in this pass.
    pub remaining: usize,
}

impl ReviewView {
    pub fn from_session(session: &ReviewSession) -> Self {
        let current = session.current();
        Self {
            prompt: prompt_for(session),
            current_item: current.map(|entry| entry.name.clone()),
            options: session.options(),
            controls_disabled: current.is_none(),
            selections: session.selections().to_vec(),
            remaining: session.queue().len(),
        }
    }

    /// One `name: quantity` line per selection.
    pub fn selection_lines(&self) -> Vec<String> {
        self.selections.iter().map(ToString::to_string).collect()
    }
}

/// Prompt text for the current step.
pub fn prompt_for(session: &ReviewSession) -> String {
    match session.current() {
        Some(entry) => format!("Item: {}", entry),
        None => ALL_REVIEWED_PROMPT.to_string(),
    }
}
