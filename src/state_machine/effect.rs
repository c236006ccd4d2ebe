//! Effects produced by state transitions

use super::patch::StatePatch;
use super::state::ConversationState;
use crate::broker::OutboundTopic;
use crate::events::PipelineEvent;
use serde_json::Value;

/// I/O to perform after a transition, in order
#[derive(Debug, Clone)]
pub enum Effect {
    /// Record an event in the conversation's audit log
    AppendLog {
        conversation_id: String,
        sort_key: String,
        payload: Value,
    },

    /// Publish an event, partitioned by conversation id
    Publish {
        topic: OutboundTopic,
        partition_key: String,
        payload: Value,
    },

    /// First sighting of a conversation: write the full record
    PutState(Box<ConversationState>),

    /// Partial update of an existing record
    PatchState {
        conversation_id: String,
        patch: StatePatch,
    },
}

impl Effect {
    pub fn log_event<E: PipelineEvent>(event: &E) -> Self {
        Effect::AppendLog {
            conversation_id: event.conversation().id.clone(),
            sort_key: event.log_sort_key(),
            payload: event.to_value(),
        }
    }

    pub fn publish<E: PipelineEvent>(topic: OutboundTopic, event: &E) -> Self {
        Effect::Publish {
            topic,
            partition_key: event.conversation().id.clone(),
            payload: event.to_value(),
        }
    }

    pub fn put_state(state: ConversationState) -> Self {
        Effect::PutState(Box::new(state))
    }

    pub fn patch_state(conversation_id: impl Into<String>, patch: StatePatch) -> Self {
        Effect::PatchState {
            conversation_id: conversation_id.into(),
            patch,
        }
    }
}
