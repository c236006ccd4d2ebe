//! Assertion aggregator / responder stage
//!
//! Consumes assertion events, rules on each with the decision policy, and
//! emits at most one update event plus exactly one decision event per
//! assertion. The conversation state is read before deciding and written last.

mod derive;
mod policy;

pub use policy::DecisionPolicy;

use crate::broker::BrokerRecord;
use crate::events::{AssertionEvent, PipelineEvent};
use crate::runtime::{EffectExecutor, Publisher, Stage, StageError, StateStore};
use crate::state_machine::on_assertion;
use async_trait::async_trait;
use chrono::Utc;

pub struct Responder<S, P> {
    policy: DecisionPolicy,
    executor: EffectExecutor<S, P>,
}

impl<S: StateStore, P: Publisher> Responder<S, P> {
    pub fn new(policy: DecisionPolicy, executor: EffectExecutor<S, P>) -> Self {
        Self { policy, executor }
    }

    async fn handle(&self, event: &AssertionEvent) -> Result<(), StageError> {
        let conversation_id = &event.conversation.id;
        let state = self.executor.store().get(conversation_id).await?;

        let ruling = self.policy.decide(&event.assertion);
        let update = derive::update_event(event, &ruling);
        let decision = derive::decision_event(event, &ruling);

        let result = on_assertion(state.as_ref(), event, update.as_ref(), &decision, Utc::now())?;
        self.executor.execute(result.effects).await?;

        tracing::info!(
            conversation_id = %conversation_id,
            event_id = %event.id(),
            correlation_id = %event.metadata.correlation_id,
            assertion_type = %event.assertion.assertion_type,
            confidence = event.assertion.confidence,
            decision = ruling.decision.as_str(),
            responded = update.is_some(),
            assertions = result.new_state.assertions.len(),
            "Assertion decided"
        );
        Ok(())
    }
}

#[async_trait]
impl<S: StateStore, P: Publisher> Stage for Responder<S, P> {
    fn name(&self) -> &'static str {
        "responder"
    }

    async fn process(&self, record: &BrokerRecord) -> Result<(), StageError> {
        let payload = record.decode_value()?;
        let event = AssertionEvent::parse(&payload)?;
        self.handle(&event).await
    }
}
