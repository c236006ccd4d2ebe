//! Event contracts shared by every pipeline stage
//!
//! Each stage validates its input against these shapes before acting on it.
//! A payload that cannot be read as any known shape is a poison message.

mod assertion;
mod command;
mod envelope;
mod evaluation;
mod outcome;
mod validate;

pub use assertion::{Assertion, AssertionEvent, AssertionType};
pub use command::ConversationCommand;
pub use envelope::{ConversationRef, EventEnvelope, EventMetadata, PipelineEvent};
pub use evaluation::{AgentKind, Classification, Evaluation, EvaluationEvent};
pub use outcome::{ConversationUpdate, DecisionEvent, DecisionRecord, DecisionType, UpdateEvent, UpdateType};
pub use validate::SchemaError;
