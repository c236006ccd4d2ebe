//! Assertion events: an evaluator agent's opinion about a conversation

use super::envelope::{impl_pipeline_event, ConversationRef, EventEnvelope, EventMetadata, EventType};
use super::evaluation::EvaluationEvent;
use super::validate::{check_common, decode_shape, non_empty, read_header, SchemaError};
use super::PipelineEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Assertion type. Unknown values are kept verbatim rather than rejected so the
/// decision policy can resolve them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssertionType {
    ResponseRecommendation,
    ActionRequired,
    CustomerSpendAnalysis,
    NoActionNeeded,
    Other(String),
}

impl AssertionType {
    pub fn as_str(&self) -> &str {
        match self {
            AssertionType::ResponseRecommendation => "RESPONSE_RECOMMENDATION",
            AssertionType::ActionRequired => "ACTION_REQUIRED",
            AssertionType::CustomerSpendAnalysis => "CUSTOMER_SPEND_ANALYSIS",
            AssertionType::NoActionNeeded => "NO_ACTION_NEEDED",
            AssertionType::Other(other) => other,
        }
    }
}

impl From<String> for AssertionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "RESPONSE_RECOMMENDATION" => AssertionType::ResponseRecommendation,
            "ACTION_REQUIRED" => AssertionType::ActionRequired,
            "CUSTOMER_SPEND_ANALYSIS" => AssertionType::CustomerSpendAnalysis,
            "NO_ACTION_NEEDED" => AssertionType::NoActionNeeded,
            _ => AssertionType::Other(value),
        }
    }
}

impl From<AssertionType> for String {
    fn from(value: AssertionType) -> Self {
        match value {
            AssertionType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AssertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    /// In [0, 1]
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    pub assertion: Assertion,
}

impl_pipeline_event!(AssertionEvent);

impl AssertionEvent {
    pub fn new(conversation: ConversationRef, metadata: EventMetadata, assertion: Assertion) -> Self {
        Self {
            envelope: EventEnvelope::new(EventType::Assertion),
            conversation,
            metadata,
            assertion,
        }
    }

    /// Assertion an agent makes about `evaluation`; one id per evaluation and agent
    pub fn for_evaluation(evaluation: &EvaluationEvent, assertion: Assertion) -> Self {
        Self {
            envelope: EventEnvelope::derived(EventType::Assertion, evaluation.id(), &assertion.agent_id),
            conversation: evaluation.conversation.clone(),
            metadata: evaluation.metadata.follow_on(),
            assertion,
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, SchemaError> {
        let (event_type, value) = read_header(payload)?;
        if event_type != EventType::Assertion {
            return Err(SchemaError::UnexpectedType {
                expected: "assertion.created",
                found: event_type,
            });
        }
        let event: AssertionEvent = decode_shape(value, "assertion.created")?;
        check_common(&event.envelope, &event.conversation, &event.metadata)?;
        let confidence = event.assertion.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(SchemaError::ConfidenceOutOfRange(confidence));
        }
        non_empty(&event.assertion.agent_id, "assertion.agentId")?;
        Ok(event)
    }
}
