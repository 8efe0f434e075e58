//! State types for the review state machine.
//!
//! A `ReviewSession` owns the queue of items still to ask about and the
//! selections made so far. The head of the queue is always the item being
//! reviewed; there is no separate cursor to fall out of sync.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry};

/// What happens to the current item once it has been confirmed or skipped.
///
/// The two policies are not equivalent: under `Rotate` the queue never
/// empties, under `Consume` every item is asked about exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancePolicy {
    /// Move the item to the tail so it comes round again on the next pass.
    Rotate,
    /// Drop the item from the queue for good.
    Consume,
}

impl fmt::Display for AdvancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rotate => write!(f, "rotate"),
            Self::Consume => write!(f, "consume"),
        }
    }
}

impl FromStr for AdvancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotate" => Ok(Self::Rotate),
            "consume" => Ok(Self::Consume),
            other => Err(format!(
                "unknown advance policy `{}` (expected `rotate` or `consume`)",
                other
            )),
        }
    }
}

/// A confirmed item and the quantity chosen for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    pub quantity: u32,
}

impl Selection {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.quantity)
    }
}

/// A confirm that cannot be applied to the current item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("quantity {quantity} is outside 1..={max_quantity} for {name}")]
    QuantityOutOfRange {
        name: String,
        quantity: u32,
        max_quantity: u32,
    },
}

/// What an operation did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The current item was added to the selections and the queue advanced.
    Confirmed(Selection),
    /// The current item was passed over and the queue advanced.
    Skipped(CatalogEntry),
    /// Queue and selections were restored to their initial values.
    Reset,
    /// Confirm without a quantity. Nothing changed.
    NoQuantity,
    /// Confirm or skip with nothing left to review. Nothing changed.
    QueueEmpty,
    /// The operation was refused. Nothing changed.
    Rejected(ReviewError),
}

/// Queue and selections for one shopper's pass over the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSession {
    catalog: Catalog,
    policy: AdvancePolicy,
    queue: VecDeque<CatalogEntry>,
    selections: Vec<Selection>,
}

impl ReviewSession {
    /// Start a session with the full catalog pending and no selections.
    pub fn new(catalog: Catalog, policy: AdvancePolicy) -> Self {
        let queue = catalog.iter().cloned().collect();
        Self {
            catalog,
            policy,
            queue,
            selections: Vec::new(),
        }
    }

    /// The item being asked about, or `None` once nothing is pending.
    pub fn current(&self) -> Option<&CatalogEntry> {
        self.queue.front()
    }

    /// Quantities the picker should offer for the current item.
    pub fn options(&self) -> Vec<u32> {
        self.current().map(CatalogEntry::options).unwrap_or_default()
    }

    pub fn queue(&self) -> &VecDeque<CatalogEntry> {
        &self.queue
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    /// Record the current item with `quantity` and advance.
    ///
    /// A missing quantity is a no-op, as is confirming with an empty queue.
    /// An out-of-range quantity is an error and leaves the session untouched.
    pub fn confirm(&mut self, quantity: Option<u32>) -> Result<Outcome, ReviewError> {
        let Some(quantity) = quantity else {
            return Ok(Outcome::NoQuantity);
        };
        let Some(entry) = self.current() else {
            return Ok(Outcome::QueueEmpty);
        };
        if !entry.allows(quantity) {
            return Err(ReviewError::QuantityOutOfRange {
                name: entry.name.clone(),
                quantity,
                max_quantity: entry.max_quantity,
            });
        }

        let selection = Selection::new(entry.name.clone(), quantity);
        self.selections.push(selection.clone());
        self.advance();
        Ok(Outcome::Confirmed(selection))
    }

    /// Pass over the current item without recording it.
    pub fn skip(&mut self) -> Outcome {
        match self.advance() {
            Some(entry) => Outcome::Skipped(entry),
            None => Outcome::QueueEmpty,
        }
    }

    /// Restore the full catalog in its original order and clear selections.
    pub fn reset(&mut self) -> Outcome {
        self.queue = self.catalog.iter().cloned().collect();
        self.selections.clear();
        Outcome::Reset
    }

    /// Apply the advance policy to the head of the queue.
    fn advance(&mut self) -> Option<CatalogEntry> {
        let head = self.queue.pop_front()?;
        if self.policy == AdvancePolicy::Rotate {
            self.queue.push_back(head.clone());
        }
        Some(head)
    }
}
