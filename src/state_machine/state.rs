//! Conversation state types

use crate::events::{AssertionEvent, AssertionType, ConversationRef, DecisionType, PipelineEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status. Only moves forward: WAITING → ACTIVE → CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    #[default]
    Waiting,
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStatus::Waiting => "WAITING",
            ConversationStatus::Active => "ACTIVE",
            ConversationStatus::Closed => "CLOSED",
        }
    }

    /// Position in the lifecycle; stored alongside the status so the store
    /// can refuse backward moves without reading first
    pub fn rank(self) -> u8 {
        match self {
            ConversationStatus::Waiting => 0,
            ConversationStatus::Active => 1,
            ConversationStatus::Closed => 2,
        }
    }

    pub fn can_advance_to(self, next: ConversationStatus) -> bool {
        next.rank() >= self.rank()
    }

    /// `next` if that is a forward (or same) move, otherwise `self`
    #[must_use]
    pub fn advance(self, next: ConversationStatus) -> ConversationStatus {
        if self.can_advance_to(next) {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WAITING" => Ok(ConversationStatus::Waiting),
            "ACTIVE" => Ok(ConversationStatus::Active),
            "CLOSED" => Ok(ConversationStatus::Closed),
            _ => Err(format!("unknown conversation status: {s}")),
        }
    }
}

/// One entry of the append-only assertion log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionRecord {
    /// Id of the assertion event that produced this entry
    pub id: Uuid,
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub agent_id: String,
    pub confidence: f64,
    pub received_at: DateTime<Utc>,
}

impl AssertionRecord {
    pub fn from_event(event: &AssertionEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            id: event.id(),
            assertion_type: event.assertion.assertion_type.clone(),
            agent_id: event.assertion.agent_id.clone(),
            confidence: event.assertion.confidence,
            received_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDecision {
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub made_at: DateTime<Utc>,
}

/// Mutable per-conversation record. Never deleted; closure is a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation: ConversationRef,
    pub status: ConversationStatus,
    /// Latest correlation id seen for this conversation
    pub correlation_id: String,
    pub assertions: Vec<AssertionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<LastDecision>,
    pub message_count: u64,
    pub responses_sent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(
        conversation: ConversationRef,
        status: ConversationStatus,
        correlation_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation,
            status,
            correlation_id: correlation_id.into(),
            assertions: Vec::new(),
            last_decision: None,
            message_count: 0,
            responses_sent: 0,
            closed_at: if status == ConversationStatus::Closed {
                Some(now)
            } else {
                None
            },
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.conversation.id
    }

    pub fn has_assertion(&self, assertion_id: Uuid) -> bool {
        self.assertions.iter().any(|a| a.id == assertion_id)
    }

    /// Fold a full record into this stored one the way the store's upsert
    /// does: nothing newer is ever undone.
    pub fn merge(&mut self, incoming: &ConversationState) {
        if incoming.updated_at >= self.updated_at {
            self.correlation_id.clone_from(&incoming.correlation_id);
        }
        self.status = self.status.advance(incoming.status);
        if let Some(decision) = incoming.last_decision {
            let newer = match self.last_decision {
                Some(current) => decision.made_at >= current.made_at,
                None => true,
            };
            if newer {
                self.last_decision = Some(decision);
            }
        }
        self.message_count = self.message_count.max(incoming.message_count);
        self.responses_sent = self.responses_sent.max(incoming.responses_sent);
        self.closed_at = self.closed_at.or(incoming.closed_at);
        self.created_at = self.created_at.min(incoming.created_at);
        self.updated_at = self.updated_at.max(incoming.updated_at);
        for record in &incoming.assertions {
            if !self.has_assertion(record.id) {
                self.assertions.push(record.clone());
            }
        }
    }
}
