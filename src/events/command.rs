//! Conversation command events: the command evaluator's input

use super::envelope::{impl_pipeline_event, ConversationRef, EventEnvelope, EventMetadata, EventType};
use super::validate::{check_common, decode_shape, read_header, SchemaError};
use super::PipelineEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text a customer sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl CustomerMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sent_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInitiated {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<CustomerMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceived {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    pub message: CustomerMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationClosed {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl_pipeline_event!(ConversationInitiated, MessageReceived, ConversationClosed);

/// A validated command event, one variant per command type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConversationCommand {
    Initiated(ConversationInitiated),
    MessageReceived(MessageReceived),
    Closed(ConversationClosed),
}

impl ConversationCommand {
    /// Decode and validate raw bytes against the known command variants
    pub fn parse(payload: &[u8]) -> Result<Self, SchemaError> {
        let (event_type, value) = read_header(payload)?;
        let command = match event_type {
            EventType::ConversationInitiated => {
                ConversationCommand::Initiated(decode_shape(value, "conversation.initiated")?)
            }
            EventType::MessageReceived => ConversationCommand::MessageReceived(decode_shape(
                value,
                "conversation.message_received",
            )?),
            EventType::ConversationClosed => {
                ConversationCommand::Closed(decode_shape(value, "conversation.closed")?)
            }
            other => {
                return Err(SchemaError::UnexpectedType {
                    expected: "conversation command",
                    found: other,
                })
            }
        };
        check_common(command.envelope(), command.conversation(), command.metadata())?;
        Ok(command)
    }

    pub fn initiated(
        conversation: ConversationRef,
        correlation_id: &str,
        initial_message: Option<&str>,
    ) -> Self {
        ConversationCommand::Initiated(ConversationInitiated {
            envelope: EventEnvelope::new(EventType::ConversationInitiated),
            conversation,
            metadata: EventMetadata::new(correlation_id),
            initial_message: initial_message.map(CustomerMessage::new),
        })
    }

    pub fn message_received(conversation: ConversationRef, correlation_id: &str, text: &str) -> Self {
        ConversationCommand::MessageReceived(MessageReceived {
            envelope: EventEnvelope::new(EventType::MessageReceived),
            conversation,
            metadata: EventMetadata::new(correlation_id),
            message: CustomerMessage::new(text),
        })
    }

    pub fn closed(conversation: ConversationRef, correlation_id: &str, reason: Option<&str>) -> Self {
        ConversationCommand::Closed(ConversationClosed {
            envelope: EventEnvelope::new(EventType::ConversationClosed),
            conversation,
            metadata: EventMetadata::new(correlation_id),
            reason: reason.map(String::from),
        })
    }

    /// Customer text carried by the command, if any
    pub fn message_text(&self) -> Option<&str> {
        let text = match self {
            ConversationCommand::Initiated(c) => c.initial_message.as_ref().map(|m| m.text.as_str()),
            ConversationCommand::MessageReceived(c) => Some(c.message.text.as_str()),
            ConversationCommand::Closed(_) => None,
        };
        text.filter(|text| !text.trim().is_empty())
    }

    pub fn is_initiation(&self) -> bool {
        matches!(self, ConversationCommand::Initiated(_))
    }

    pub fn is_closure(&self) -> bool {
        matches!(self, ConversationCommand::Closed(_))
    }
}

impl PipelineEvent for ConversationCommand {
    fn envelope(&self) -> &EventEnvelope {
        match self {
            ConversationCommand::Initiated(c) => &c.envelope,
            ConversationCommand::MessageReceived(c) => &c.envelope,
            ConversationCommand::Closed(c) => &c.envelope,
        }
    }

    fn conversation(&self) -> &ConversationRef {
        match self {
            ConversationCommand::Initiated(c) => &c.conversation,
            ConversationCommand::MessageReceived(c) => &c.conversation,
            ConversationCommand::Closed(c) => &c.conversation,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            ConversationCommand::Initiated(c) => &c.metadata,
            ConversationCommand::MessageReceived(c) => &c.metadata,
            ConversationCommand::Closed(c) => &c.metadata,
        }
    }
}
