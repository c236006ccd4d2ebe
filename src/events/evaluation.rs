//! Evaluation events: the command evaluator's output

use super::envelope::{impl_pipeline_event, ConversationRef, EventEnvelope, EventMetadata, EventType};
use super::validate::{check_common, decode_shape, read_header, SchemaError};
use super::{ConversationCommand, PipelineEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    ActionRequired,
    ResponseRecommendation,
    NoAction,
}

/// Evaluator agents the orchestrator can fan out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    ResponseRecommendation,
    SpendAnalysis,
}

impl AgentKind {
    pub const ALL: [AgentKind; 2] = [AgentKind::ResponseRecommendation, AgentKind::SpendAnalysis];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::ResponseRecommendation => "response-recommendation",
            AgentKind::SpendAnalysis => "spend-analysis",
        }
    }

    /// `agentId` stamped on assertions this agent produces
    pub fn agent_id(self) -> &'static str {
        match self {
            AgentKind::ResponseRecommendation => "response-recommendation-agent",
            AgentKind::SpendAnalysis => "spend-analysis-agent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        AgentKind::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub classification: Classification,
    /// Short machine-readable reason code (`urgent`, `cancellation`, ...)
    pub reason: String,
    pub reasoning: String,
    pub suggested_actions: Vec<String>,
    /// Routing: which agents should evaluate this command
    pub agents: Vec<AgentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub source_event_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub conversation: ConversationRef,
    pub metadata: EventMetadata,
    pub evaluation: Evaluation,
}

impl_pipeline_event!(EvaluationEvent);

impl EvaluationEvent {
    /// Evaluation caused by `command`: same conversation and correlation id,
    /// an id derived from the command's and fresh timestamps
    pub fn for_command(command: &ConversationCommand, evaluation: Evaluation) -> Self {
        Self {
            envelope: EventEnvelope::derived(EventType::Evaluation, command.id(), "command-evaluator"),
            conversation: command.conversation().clone(),
            metadata: command.metadata().follow_on(),
            evaluation,
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, SchemaError> {
        let (event_type, value) = read_header(payload)?;
        if event_type != EventType::Evaluation {
            return Err(SchemaError::UnexpectedType {
                expected: "conversation.evaluation",
                found: event_type,
            });
        }
        let event: EvaluationEvent = decode_shape(value, "conversation.evaluation")?;
        check_common(&event.envelope, &event.conversation, &event.metadata)?;
        Ok(event)
    }

    pub fn routes_to(&self, agent: AgentKind) -> bool {
        self.evaluation.agents.contains(&agent)
    }
}
