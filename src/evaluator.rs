//! Command evaluator stage
//!
//! Consumes conversation commands, classifies them with a keyword detector,
//! picks the evaluator agents to fan out to, and emits exactly one evaluation
//! event per command.

mod classify;
mod lexicon;

use classify::evaluate;
pub use lexicon::{IntentDetector, Lexicon, SubstringMatcher, TokenMatcher};

use crate::broker::BrokerRecord;
use crate::events::{ConversationCommand, EvaluationEvent, PipelineEvent};
use crate::runtime::{EffectExecutor, Publisher, Stage, StageError, StateStore};
use crate::state_machine::on_command;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub struct CommandEvaluator<S, P> {
    detector: Arc<dyn IntentDetector>,
    executor: EffectExecutor<S, P>,
}

impl<S: StateStore, P: Publisher> CommandEvaluator<S, P> {
    pub fn new(detector: Arc<dyn IntentDetector>, executor: EffectExecutor<S, P>) -> Self {
        Self { detector, executor }
    }

    async fn handle(&self, command: &ConversationCommand) -> Result<(), StageError> {
        let conversation_id = &command.conversation().id;
        let state = self.executor.store().get(conversation_id).await?;

        let evaluation = evaluate(command, self.detector.as_ref());
        let reason = evaluation.reason;
        let event = EvaluationEvent::for_command(command, evaluation.into_payload(command));

        let result = on_command(state.as_ref(), command, &event, Utc::now())?;
        self.executor.execute(result.effects).await?;

        tracing::info!(
            conversation_id = %conversation_id,
            event_id = %command.id(),
            correlation_id = %command.metadata().correlation_id,
            detector = self.detector.name(),
            classification = ?event.evaluation.classification,
            reason,
            agents = ?event.evaluation.agents,
            status = result.new_state.status.as_str(),
            "Command evaluated"
        );
        Ok(())
    }
}

#[async_trait]
impl<S: StateStore, P: Publisher> Stage for CommandEvaluator<S, P> {
    fn name(&self) -> &'static str {
        "command-evaluator"
    }

    async fn process(&self, record: &BrokerRecord) -> Result<(), StageError> {
        let payload = record.decode_value()?;
        let command = ConversationCommand::parse(&payload)?;
        self.handle(&command).await
    }
}
