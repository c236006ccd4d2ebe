//! Envelope, conversation reference and metadata carried by every event

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Schema version stamped on every event this service produces
pub const SCHEMA_VERSION: &str = "1.0";

/// Discriminator for every event shape in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "conversation.initiated")]
    ConversationInitiated,
    #[serde(rename = "conversation.message_received")]
    MessageReceived,
    #[serde(rename = "conversation.closed")]
    ConversationClosed,
    #[serde(rename = "conversation.evaluation")]
    Evaluation,
    #[serde(rename = "assertion.created")]
    Assertion,
    #[serde(rename = "conversation.update")]
    Update,
    #[serde(rename = "conversation.decision")]
    Decision,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::ConversationInitiated,
        EventType::MessageReceived,
        EventType::ConversationClosed,
        EventType::Evaluation,
        EventType::Assertion,
        EventType::Update,
        EventType::Decision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ConversationInitiated => "conversation.initiated",
            EventType::MessageReceived => "conversation.message_received",
            EventType::ConversationClosed => "conversation.closed",
            EventType::Evaluation => "conversation.evaluation",
            EventType::Assertion => "assertion.created",
            EventType::Update => "conversation.update",
            EventType::Decision => "conversation.decision",
        }
    }

    /// Commands are the only inbound shapes the command evaluator accepts
    pub fn is_command(self) -> bool {
        matches!(
            self,
            EventType::ConversationInitiated
                | EventType::MessageReceived
                | EventType::ConversationClosed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// `{id, type, schemaVersion}` header embedded in every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub schema_version: String,
}

impl EventEnvelope {
    /// Fresh envelope with a new globally unique id
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }

    /// Envelope for the event `producer` emits in response to `cause`.
    ///
    /// The id is name-based, so reprocessing the same cause yields the same
    /// id and every consumer (the event log included) can drop the repeat.
    pub fn derived(event_type: EventType, cause: Uuid, producer: &str) -> Self {
        let name = format!("{event_type}/{producer}");
        Self {
            id: Uuid::new_v5(&cause, name.as_bytes()),
            event_type,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// Identity of a conversation. Immutable once the conversation exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub id: String,
    pub customer_id: String,
    pub organization_id: String,
}

impl ConversationRef {
    pub fn new(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            organization_id: organization_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Threads one causal chain from command to final decision
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            correlation_id: correlation_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Metadata for an event caused by the one carrying `self`
    pub fn follow_on(&self) -> Self {
        Self::new(self.correlation_id.clone())
    }
}

/// Accessors shared by every event shape
pub trait PipelineEvent: Serialize {
    fn envelope(&self) -> &EventEnvelope;
    fn conversation(&self) -> &ConversationRef;
    fn metadata(&self) -> &EventMetadata;

    fn id(&self) -> Uuid {
        self.envelope().id
    }

    /// Event-log sort key: creation time (millisecond RFC 3339) then event id.
    ///
    /// Derived from event content only, so a redelivered event maps to the
    /// same log slot. Events re-derived on a replay carry fresh timestamps
    /// but the same id, and the log dedupes on the id as well.
    fn log_sort_key(&self) -> String {
        format!(
            "{}#{}",
            self.metadata()
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            self.envelope().id
        )
    }

    fn to_value(&self) -> Value
    where
        Self: Sized,
    {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Implements `PipelineEvent` for structs with `envelope`, `conversation` and `metadata` fields
macro_rules! impl_pipeline_event {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::events::PipelineEvent for $ty {
                fn envelope(&self) -> &$crate::events::EventEnvelope {
                    &self.envelope
                }

                fn conversation(&self) -> &$crate::events::ConversationRef {
                    &self.conversation
                }

                fn metadata(&self) -> &$crate::events::EventMetadata {
                    &self.metadata
                }
            }
        )+
    };
}

pub(crate) use impl_pipeline_event;
