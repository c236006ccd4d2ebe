//! Evaluator agent stage
//!
//! One stage per agent kind. Each consumes evaluation events, skips the ones
//! not routed to it, asks the completion service for a verdict on the
//! customer's message, and publishes the result as an assertion event.

mod prompt;
mod verdict;

use crate::broker::{BrokerRecord, OutboundTopic, TopicMap};
use crate::events::{AgentKind, AssertionEvent, EvaluationEvent, PipelineEvent};
use crate::llm::CompletionService;
use crate::runtime::{PublishError, Publisher, Stage, StageError};
use async_trait::async_trait;
use std::sync::Arc;

pub struct AgentStage<P> {
    kind: AgentKind,
    completion: Arc<dyn CompletionService>,
    publisher: P,
    topics: TopicMap,
}

impl<P: Publisher> AgentStage<P> {
    pub fn new(
        kind: AgentKind,
        completion: Arc<dyn CompletionService>,
        publisher: P,
        topics: TopicMap,
    ) -> Self {
        Self {
            kind,
            completion,
            publisher,
            topics,
        }
    }

    async fn handle(&self, event: &EvaluationEvent) -> Result<(), StageError> {
        if !event.routes_to(self.kind) {
            tracing::debug!(
                agent = self.kind.as_str(),
                event_id = %event.id(),
                "Evaluation not routed to this agent"
            );
            return Ok(());
        }
        let Some((messages, options)) = prompt::build(self.kind, event) else {
            tracing::debug!(
                agent = self.kind.as_str(),
                event_id = %event.id(),
                "Evaluation carries no message"
            );
            return Ok(());
        };

        let completion = self.completion.complete(&messages, &options).await?;
        let assertion = verdict::parse(self.kind, &completion.content).map_err(|detail| {
            StageError::MalformedCompletion {
                agent_id: self.kind.agent_id(),
                detail,
            }
        })?;

        let assertion_event = AssertionEvent::for_evaluation(event, assertion);
        let payload = serde_json::to_vec(&assertion_event)
            .map_err(|e| PublishError::Encode(e.to_string()))?;
        let topic = self.topics.name(OutboundTopic::Assertions);
        self.publisher
            .publish(topic, &event.conversation.id, &payload)
            .await?;

        tracing::info!(
            agent = self.kind.as_str(),
            conversation_id = %event.conversation.id,
            event_id = %assertion_event.id(),
            correlation_id = %event.metadata.correlation_id,
            assertion_type = %assertion_event.assertion.assertion_type,
            confidence = assertion_event.assertion.confidence,
            model = %completion.model,
            "Assertion published"
        );
        Ok(())
    }
}

#[async_trait]
impl<P: Publisher> Stage for AgentStage<P> {
    fn name(&self) -> &'static str {
        self.kind.agent_id()
    }

    async fn process(&self, record: &BrokerRecord) -> Result<(), StageError> {
        let payload = record.decode_value()?;
        let event = EvaluationEvent::parse(&payload)?;
        self.handle(&event).await
    }
}
