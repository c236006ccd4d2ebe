//! Update and decision events: the responder's output

use super::envelope::{impl_pipeline_event, ConversationRef, EventEnvelope, EventMetadata, EventType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Producer name the responder's derived event ids are scoped to
const RESPONDER: &str = "responder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateType {
    AiResponse,
    StatusChange,
}

/// Customer-visible outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdate {
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub content: String,
    pub assertion_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    pub update: ConversationUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    RespondToCustomer,
    EscalateToHuman,
    WaitForMoreInfo,
    NoAction,
}

impl DecisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionType::RespondToCustomer => "RESPOND_TO_CUSTOMER",
            DecisionType::EscalateToHuman => "ESCALATE_TO_HUMAN",
            DecisionType::WaitForMoreInfo => "WAIT_FOR_MORE_INFO",
            DecisionType::NoAction => "NO_ACTION",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            DecisionType::RespondToCustomer,
            DecisionType::EscalateToHuman,
            DecisionType::WaitForMoreInfo,
            DecisionType::NoAction,
        ]
        .into_iter()
        .find(|d| d.as_str() == name)
    }
}

/// The responder's ruling on one assertion; fed back to orchestration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub should_respond: bool,
    pub reasoning: String,
    pub assertion_id: Uuid,
    pub next_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    pub decision: DecisionRecord,
}

impl_pipeline_event!(UpdateEvent, DecisionEvent);

impl UpdateEvent {
    pub fn new(conversation: ConversationRef, metadata: EventMetadata, update: ConversationUpdate) -> Self {
        Self {
            envelope: EventEnvelope::derived(EventType::Update, update.assertion_id, RESPONDER),
            conversation,
            metadata,
            update,
        }
    }
}

impl DecisionEvent {
    pub fn new(conversation: ConversationRef, metadata: EventMetadata, decision: DecisionRecord) -> Self {
        Self {
            envelope: EventEnvelope::derived(EventType::Decision, decision.assertion_id, RESPONDER),
            conversation,
            metadata,
            decision,
        }
    }
}
