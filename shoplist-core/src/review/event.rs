//! Events that trigger state transitions.
//!
//! Events are what the shopper did: pressed a button on the page, or
//! answered a spoken prompt. They are inputs to the pure transition function.

use std::fmt;

/// All events that can trigger a review transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Add the current item with the chosen quantity.
    ///
    /// `quantity` is `None` when the picker was left empty.
    Confirm { quantity: Option<u32> },

    /// Pass over the current item.
    Skip,

    /// Start over from the full catalog with no selections.
    Reset,
}

impl Event {
    /// Short description for log lines.
    pub fn log_summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirm {
                quantity: Some(quantity),
            } => write!(f, "Confirm({})", quantity),
            Self::Confirm { quantity: None } => write!(f, "Confirm(none)"),
            Self::Skip => write!(f, "Skip"),
            Self::Reset => write!(f, "Reset"),
        }
    }
}
