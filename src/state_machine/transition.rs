//! Pure state transition functions
//!
//! Given the stored state (if any) and an already-decided inbound event,
//! compute the next state and the ordered effects that realize it. No I/O.
//! Effect order: inbound event logged, outbound events published, outbound
//! events logged, state written.

use super::{ConversationState, ConversationStatus, Effect, StatePatch};
use super::state::{AssertionRecord, LastDecision};
use crate::broker::OutboundTopic;
use crate::events::{
    AssertionEvent, ConversationCommand, ConversationRef, DecisionEvent, EvaluationEvent,
    PipelineEvent, UpdateEvent,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(
        "conversation {conversation_id} is owned by customer {stored_customer}/{stored_organization}, \
         event names {event_customer}/{event_organization}"
    )]
    IdentityMismatch {
        conversation_id: String,
        stored_customer: String,
        stored_organization: String,
        event_customer: String,
        event_organization: String,
    },
}

fn check_identity(
    state: Option<&ConversationState>,
    incoming: &ConversationRef,
) -> Result<(), TransitionError> {
    match state {
        Some(stored) if stored.conversation != *incoming => Err(TransitionError::IdentityMismatch {
            conversation_id: incoming.id.clone(),
            stored_customer: stored.conversation.customer_id.clone(),
            stored_organization: stored.conversation.organization_id.clone(),
            event_customer: incoming.customer_id.clone(),
            event_organization: incoming.organization_id.clone(),
        }),
        _ => Ok(()),
    }
}

/// Emit the state writes and return the state they produce.
///
/// An unseen conversation is first written as a bare WAITING record; every
/// change then goes through the patch, so two writers racing to create the
/// same conversation both land their increments.
fn write_state(
    state: Option<&ConversationState>,
    conversation: &ConversationRef,
    correlation_id: &str,
    patch: StatePatch,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) -> ConversationState {
    let mut next = match state {
        Some(existing) => existing.clone(),
        None => {
            let created = ConversationState::new(
                conversation.clone(),
                ConversationStatus::Waiting,
                correlation_id,
                now,
            );
            effects.push(Effect::put_state(created.clone()));
            created
        }
    };
    patch.apply_to(&mut next);
    effects.push(Effect::patch_state(conversation.id.clone(), patch));
    next
}

/// Command evaluator transition.
///
/// First command creates the state as WAITING (CLOSED for a close command);
/// later commands bump the message counter and may close the conversation.
/// The counter moves once per command id, however often it is delivered.
pub fn on_command(
    state: Option<&ConversationState>,
    command: &ConversationCommand,
    evaluation: &EvaluationEvent,
    now: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    check_identity(state, command.conversation())?;

    let has_message = command.message_text().is_some();
    let closing = command.is_closure().then_some(ConversationStatus::Closed);
    let correlation_id = &command.metadata().correlation_id;

    let mut effects = vec![
        Effect::log_event(command),
        Effect::publish(OutboundTopic::Evaluations, evaluation),
        Effect::log_event(evaluation),
    ];

    let patch = StatePatch {
        status: closing,
        correlation_id: Some(correlation_id.clone()),
        add_messages: has_message.then_some(1),
        command_id: Some(command.id()),
        updated_at: Some(now),
        ..StatePatch::default()
    };
    let new_state = write_state(
        state,
        command.conversation(),
        correlation_id,
        patch,
        now,
        &mut effects,
    );

    Ok(TransitionResult::new(new_state).with_effects(effects))
}

/// Responder transition.
///
/// Appends the assertion (once per assertion id), refreshes `lastDecision`
/// and `updatedAt`, and activates a waiting conversation. With no stored
/// state a new ACTIVE record is created from the assertion's conversation.
/// `responsesSent` moves only when the assertion is appended.
pub fn on_assertion(
    state: Option<&ConversationState>,
    assertion: &AssertionEvent,
    update: Option<&UpdateEvent>,
    decision: &DecisionEvent,
    now: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    check_identity(state, assertion.conversation())?;

    let mut effects = vec![Effect::log_event(assertion)];
    if let Some(update) = update {
        effects.push(Effect::publish(OutboundTopic::Updates, update));
    }
    effects.push(Effect::publish(OutboundTopic::Decisions, decision));
    if let Some(update) = update {
        effects.push(Effect::log_event(update));
    }
    effects.push(Effect::log_event(decision));

    let record = AssertionRecord::from_event(assertion, now);
    let last_decision = LastDecision {
        decision_type: decision.decision.decision_type,
        made_at: now,
    };
    let correlation_id = &assertion.metadata().correlation_id;

    let duplicate = state.is_some_and(|existing| existing.has_assertion(assertion.id()));
    if duplicate {
        tracing::debug!(
            conversation_id = %assertion.conversation().id,
            assertion_id = %assertion.id(),
            "Assertion already recorded, not appending again"
        );
    }
    let patch = StatePatch {
        status: Some(ConversationStatus::Active),
        correlation_id: Some(correlation_id.clone()),
        last_decision: Some(last_decision),
        add_responses_sent: update.is_some().then_some(1),
        append_assertion: Some(record),
        updated_at: Some(now),
        ..StatePatch::default()
    };
    let new_state = write_state(
        state,
        assertion.conversation(),
        correlation_id,
        patch,
        now,
        &mut effects,
    );

    Ok(TransitionResult::new(new_state).with_effects(effects))
}
