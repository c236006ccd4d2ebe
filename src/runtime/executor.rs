//! Effect executor
//!
//! Carries out the effects a transition produced, in order. The first failure
//! stops execution; because state writes come last, a redelivered record
//! replays the whole sequence against an unchanged state row.

use super::error::{PublishError, StageError};
use super::traits::{Publisher, StateStore};
use crate::broker::TopicMap;
use crate::state_machine::Effect;

pub struct EffectExecutor<S, P> {
    store: S,
    publisher: P,
    topics: TopicMap,
}

impl<S, P> EffectExecutor<S, P>
where
    S: StateStore,
    P: Publisher,
{
    pub fn new(store: S, publisher: P, topics: TopicMap) -> Self {
        Self {
            store,
            publisher,
            topics,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn execute(&self, effects: Vec<Effect>) -> Result<(), StageError> {
        for effect in effects {
            self.execute_effect(effect).await?;
        }
        Ok(())
    }

    async fn execute_effect(&self, effect: Effect) -> Result<(), StageError> {
        match effect {
            Effect::AppendLog {
                conversation_id,
                sort_key,
                payload,
            } => {
                self.store
                    .append_log_entry(&conversation_id, &sort_key, &payload)
                    .await?;
            }

            Effect::Publish {
                topic,
                partition_key,
                payload,
            } => {
                let topic_name = self.topics.name(topic);
                let bytes =
                    serde_json::to_vec(&payload).map_err(|e| PublishError::Encode(e.to_string()))?;
                self.publisher
                    .publish(topic_name, &partition_key, &bytes)
                    .await?;
                tracing::debug!(
                    topic = %topic_name,
                    conversation_id = %partition_key,
                    bytes = bytes.len(),
                    "Published event"
                );
            }

            Effect::PutState(state) => {
                self.store.put(&state).await?;
            }

            Effect::PatchState {
                conversation_id,
                patch,
            } => {
                self.store.update(&conversation_id, &patch).await?;
            }
        }
        Ok(())
    }
}
