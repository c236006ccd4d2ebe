//! Runtime error types
//!
//! Every stage failure is either poison (the same bytes can never succeed, so
//! the record is skipped) or transient (the batch is redelivered).

use crate::broker::RecordError;
use crate::events::SchemaError;
use crate::llm::LlmError;
use crate::state_machine::TransitionError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("state store unavailable: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("producer pool is shut down")]
    ShutDown,
    #[error("could not encode payload: {0}")]
    Encode(String),
    #[error("broker request failed: {0}")]
    Transport(String),
    #[error("broker rejected publish to {topic}: HTTP {status}: {body}")]
    Rejected {
        topic: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("undecodable record: {0}")]
    Record(#[from] RecordError),
    #[error("invalid event: {0}")]
    Schema(#[from] SchemaError),
    #[error("rejected transition: {0}")]
    Transition(#[from] TransitionError),
    #[error("malformed completion from {agent_id}: {detail}")]
    MalformedCompletion {
        agent_id: &'static str,
        detail: String,
    },
    #[error("state store: {0}")]
    Store(#[from] StoreError),
    #[error("publish: {0}")]
    Publish(#[from] PublishError),
    #[error("completion service: {0}")]
    Completion(#[from] LlmError),
}

impl StageError {
    /// Poison failures are logged and skipped; everything else redelivers
    pub fn is_poison(&self) -> bool {
        match self {
            StageError::Record(_)
            | StageError::Schema(_)
            | StageError::Transition(_)
            | StageError::MalformedCompletion { .. }
            | StageError::Store(StoreError::Corrupt(_)) => true,
            StageError::Store(_) | StageError::Publish(_) | StageError::Completion(_) => false,
        }
    }
}

/// A record that must be redelivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{} of the batch's records failed; batch must be redelivered", failures.len())]
    RecordsFailed { failures: Vec<RecordFailure> },
}
