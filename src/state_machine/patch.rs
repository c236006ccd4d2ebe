//! Typed partial update of a `ConversationState`

use super::state::{AssertionRecord, ConversationState, ConversationStatus, LastDecision};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Named optional fields; `None` leaves the stored value alone.
///
/// Counters are increments, not absolute values, and the assertion is
/// appended, so two patches for the same conversation never overwrite each
/// other's work. The increments are tied to the patch's source event: a
/// patch whose `command_id` was already applied, or whose assertion is
/// already in the log, is a replay and leaves both counters alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// Applied only if it is a forward move
    pub status: Option<ConversationStatus>,
    pub correlation_id: Option<String>,
    pub last_decision: Option<LastDecision>,
    pub add_messages: Option<u64>,
    pub add_responses_sent: Option<u64>,
    pub append_assertion: Option<AssertionRecord>,
    /// Command this patch realizes; the store remembers it to spot replays
    pub command_id: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        *self == StatePatch::default()
    }

    /// The same patch with its counter increments dropped
    #[must_use]
    pub fn as_replay(&self) -> StatePatch {
        StatePatch {
            add_messages: None,
            add_responses_sent: None,
            ..self.clone()
        }
    }

    /// In-memory equivalent of the store's partial update.
    ///
    /// Assertion replays are detected here; command replays need the set of
    /// applied command ids, which only the store holds.
    pub fn apply_to(&self, state: &mut ConversationState) {
        let replayed = self
            .append_assertion
            .as_ref()
            .is_some_and(|record| state.has_assertion(record.id));
        if replayed {
            self.as_replay().apply_fresh(state);
        } else {
            self.apply_fresh(state);
        }
    }

    fn apply_fresh(&self, state: &mut ConversationState) {
        if let Some(status) = self.status {
            let next = state.status.advance(status);
            if next == ConversationStatus::Closed && state.status != ConversationStatus::Closed {
                state.closed_at = Some(self.updated_at.unwrap_or_else(Utc::now));
            }
            state.status = next;
        }
        if let Some(correlation_id) = &self.correlation_id {
            state.correlation_id.clone_from(correlation_id);
        }
        if let Some(decision) = self.last_decision {
            state.last_decision = Some(decision);
        }
        if let Some(n) = self.add_messages {
            state.message_count += n;
        }
        if let Some(n) = self.add_responses_sent {
            state.responses_sent += n;
        }
        if let Some(record) = &self.append_assertion {
            if !state.has_assertion(record.id) {
                state.assertions.push(record.clone());
            }
        }
        if let Some(at) = self.updated_at {
            state.updated_at = at.max(state.created_at);
        }
    }
}
