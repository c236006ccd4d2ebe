//! Update and decision events derived from a ruling

use super::policy::ResponseDecision;
use crate::events::{
    AssertionEvent, ConversationUpdate, DecisionEvent, DecisionRecord, DecisionType,
    PipelineEvent, UpdateEvent, UpdateType,
};

/// Customer-visible update, only when the ruling responds with content
pub fn update_event(assertion: &AssertionEvent, ruling: &ResponseDecision) -> Option<UpdateEvent> {
    if !ruling.should_respond {
        return None;
    }
    let content = ruling.response_content.clone()?;
    let update_type = if ruling.decision == DecisionType::EscalateToHuman {
        UpdateType::StatusChange
    } else {
        UpdateType::AiResponse
    };
    Some(UpdateEvent::new(
        assertion.conversation().clone(),
        assertion.metadata().follow_on(),
        ConversationUpdate {
            update_type,
            content,
            assertion_id: assertion.id(),
        },
    ))
}

/// Feedback record, produced for every ruling
pub fn decision_event(assertion: &AssertionEvent, ruling: &ResponseDecision) -> DecisionEvent {
    DecisionEvent::new(
        assertion.conversation().clone(),
        assertion.metadata().follow_on(),
        DecisionRecord {
            decision_type: ruling.decision,
            should_respond: ruling.should_respond,
            reasoning: ruling.reasoning.clone(),
            assertion_id: assertion.id(),
            next_actions: ruling.next_actions.clone(),
        },
    )
}
