//! Pure state transition function.
//!
//! The transition function takes the current session and an event and
//! returns the new session together with what happened. It has no side
//! effects, so the web handlers and the voice worker can share it.

use super::event::Event;
use super::state::{Outcome, ReviewSession};

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The session after the transition.
    pub session: ReviewSession,
    /// What the transition did.
    pub outcome: Outcome,
}

impl TransitionResult {
    pub fn new(session: ReviewSession, outcome: Outcome) -> Self {
        Self { session, outcome }
    }
}

/// Pure state transition function.
///
/// Refused events come back as `Outcome::Rejected` with the session
/// unchanged, so the caller always gets a session to store.
pub fn transition(mut session: ReviewSession, event: Event) -> TransitionResult {
    let outcome = match event {
        Event::Confirm { quantity } => session
            .confirm(quantity)
            .unwrap_or_else(Outcome::Rejected),
        Event::Skip => session.skip(),
        Event::Reset => session.reset(),
    };
    TransitionResult::new(session, outcome)
}
