//! Explicit state machine for reviewing the catalog one item at a time.
//!
//! The design separates:
//! - **State**: the queue and selections (`ReviewSession`)
//! - **Events**: what the shopper did (`Event`)
//! - **Transition**: pure function `(ReviewSession, Event) -> TransitionResult`
//! - **View**: what to render, derived from the state alone (`ReviewView`)
//!
//! Every driver (the web handlers and the voice worker) goes through
//! `transition`, so they cannot disagree about the rules.

pub mod event;
pub mod state;
pub mod transition;
pub mod view;

pub use event::*;
pub use state::*;
pub use transition::*;
pub use view::*;
