//! Command classification and agent fan-out
//!
//! Pure over the command's content and the detector's lexicon: the same
//! command always yields the same evaluation.

use super::lexicon::{IntentDetector, IntentSignals};
use crate::events::{AgentKind, Classification, ConversationCommand, Evaluation, PipelineEvent};

pub const ACTION_PRIORITIZE_RESPONSE: &str = "prioritize_response";
pub const ACTION_NOTIFY_SUPERVISOR: &str = "notify_supervisor";
pub const ACTION_PREPARE_RETENTION_OFFER: &str = "prepare_retention_offer";
pub const ACTION_GENERATE_RESPONSE: &str = "generate_response";
pub const ACTION_ANALYZE_SENTIMENT: &str = "analyze_sentiment";

/// Classification outcome for one command, before it is wrapped in an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvaluation {
    pub classification: Classification,
    pub reason: &'static str,
    pub reasoning: String,
    pub suggested_actions: Vec<String>,
    pub agents: Vec<AgentKind>,
}

impl CommandEvaluation {
    /// Event payload for `command`
    pub fn into_payload(self, command: &ConversationCommand) -> Evaluation {
        Evaluation {
            classification: self.classification,
            reason: self.reason.to_string(),
            reasoning: self.reasoning,
            suggested_actions: self.suggested_actions,
            agents: self.agents,
            message: command.message_text().map(String::from),
            source_event_id: command.id(),
        }
    }
}

fn actions(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| (*a).to_string()).collect()
}

/// First matching rule wins: urgency, cancellation, any message,
/// initiation without message, then the default.
pub fn evaluate(command: &ConversationCommand, detector: &dyn IntentDetector) -> CommandEvaluation {
    let text = command.message_text();
    let signals = text.map(|t| detector.detect(t)).unwrap_or_default();
    let agents = select_agents(text.is_some(), signals);

    let (classification, reason, reasoning, suggested_actions) = match &text {
        Some(_) if signals.urgent => (
            Classification::ActionRequired,
            "urgent",
            "Message contains urgency indicators; respond with priority".to_string(),
            actions(&[ACTION_PRIORITIZE_RESPONSE, ACTION_NOTIFY_SUPERVISOR]),
        ),
        Some(_) if signals.cancellation => (
            Classification::ActionRequired,
            "cancellation",
            "Message expresses cancellation intent; retention handling required".to_string(),
            actions(&[ACTION_GENERATE_RESPONSE, ACTION_PREPARE_RETENTION_OFFER]),
        ),
        Some(_) => (
            Classification::ResponseRecommendation,
            "customer_message",
            "Customer message received; a response should be recommended".to_string(),
            actions(&[ACTION_GENERATE_RESPONSE, ACTION_ANALYZE_SENTIMENT]),
        ),
        None if command.is_initiation() => (
            Classification::NoAction,
            "conversation_initiated",
            "Conversation initiated without a message; nothing to evaluate yet".to_string(),
            Vec::new(),
        ),
        None => (
            Classification::NoAction,
            "no_message",
            "No customer message to evaluate".to_string(),
            Vec::new(),
        ),
    };

    CommandEvaluation {
        classification,
        reason,
        reasoning,
        suggested_actions,
        agents,
    }
}

/// Agent routing, independent of the classification branch: any message goes
/// to the response-recommendation agent; billing or cancellation talk also
/// goes to spend analysis.
pub fn select_agents(has_message: bool, signals: IntentSignals) -> Vec<AgentKind> {
    if !has_message {
        return Vec::new();
    }
    let mut agents = vec![AgentKind::ResponseRecommendation];
    if signals.billing || signals.cancellation {
        agents.push(AgentKind::SpendAnalysis);
    }
    agents
}
