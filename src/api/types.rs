//! API request and response types

use crate::db::LogEntry;
use crate::runtime::RecordFailure;
use crate::state_machine::ConversationState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Filters for the conversation listing; exactly one index is used
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub status: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationState>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogResponse {
    pub conversation_id: String,
    pub events: Vec<LogEntry>,
}

/// Body of a `500` for a batch that must be redelivered
#[derive(Debug, Serialize)]
pub struct BatchFailureResponse {
    pub error: String,
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
