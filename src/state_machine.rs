//! Conversation state machine
//!
//! Pure transitions over `ConversationState` that emit effects for the
//! runtime to execute, in the Elm Architecture style.

mod effect;
mod patch;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use patch::StatePatch;
pub use state::{AssertionRecord, ConversationState, ConversationStatus, LastDecision};
pub use transition::{on_assertion, on_command, TransitionError};
