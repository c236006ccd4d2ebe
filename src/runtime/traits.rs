//! Trait abstractions for runtime I/O
//!
//! Stages only talk to the outside world through these traits, so they can be
//! driven by in-memory doubles in tests.

use super::error::{PublishError, StageError, StoreError};
use crate::broker::BrokerRecord;
use crate::db::LogEntry;
use crate::state_machine::{ConversationState, ConversationStatus, StatePatch};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Per-conversation state plus the append-only event log
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError>;

    /// Full upsert. Assertions already stored for the conversation are kept as is.
    async fn put(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// Partial update. An empty patch is a no-op; a missing row is `NotFound`.
    async fn update(&self, conversation_id: &str, patch: &StatePatch) -> Result<(), StoreError>;

    /// Idempotent on `(conversation_id, sort_key)`
    async fn append_log_entry(
        &self,
        conversation_id: &str,
        sort_key: &str,
        payload: &Value,
    ) -> Result<(), StoreError>;

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ConversationState>, StoreError>;

    async fn list_by_status(
        &self,
        status: ConversationStatus,
    ) -> Result<Vec<ConversationState>, StoreError>;

    /// Log entries in sort-key order
    async fn list_log_entries(&self, conversation_id: &str) -> Result<Vec<LogEntry>, StoreError>;
}

/// Outbound side of the broker. Returns once the broker acknowledged the record.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError>;
}

/// A pipeline stage: handles one broker record end to end
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, record: &BrokerRecord) -> Result<(), StageError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        (**self).get(conversation_id).await
    }

    async fn put(&self, state: &ConversationState) -> Result<(), StoreError> {
        (**self).put(state).await
    }

    async fn update(&self, conversation_id: &str, patch: &StatePatch) -> Result<(), StoreError> {
        (**self).update(conversation_id, patch).await
    }

    async fn append_log_entry(
        &self,
        conversation_id: &str,
        sort_key: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        (**self)
            .append_log_entry(conversation_id, sort_key, payload)
            .await
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ConversationState>, StoreError> {
        (**self).find_by_correlation_id(correlation_id).await
    }

    async fn list_by_status(
        &self,
        status: ConversationStatus,
    ) -> Result<Vec<ConversationState>, StoreError> {
        (**self).list_by_status(status).await
    }

    async fn list_log_entries(&self, conversation_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        (**self).list_log_entries(conversation_id).await
    }
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        (**self).publish(topic, partition_key, payload).await
    }
}

#[async_trait]
impl<T: Stage + ?Sized> Stage for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn process(&self, record: &BrokerRecord) -> Result<(), StageError> {
        (**self).process(record).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::{Database, DbError};

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => StoreError::NotFound(id),
            DbError::Serialization(e) => StoreError::Corrupt(e.to_string()),
            DbError::Corrupt(detail) => StoreError::Corrupt(detail),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Adapter to use Database as a StateStore
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for DatabaseStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.db.get_state(conversation_id)?)
    }

    async fn put(&self, state: &ConversationState) -> Result<(), StoreError> {
        Ok(self.db.put_state(state)?)
    }

    async fn update(&self, conversation_id: &str, patch: &StatePatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        Ok(self.db.update_state(conversation_id, patch)?)
    }

    async fn append_log_entry(
        &self,
        conversation_id: &str,
        sort_key: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        Ok(self.db.append_log_entry(conversation_id, sort_key, payload)?)
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ConversationState>, StoreError> {
        Ok(self.db.find_by_correlation_id(correlation_id)?)
    }

    async fn list_by_status(
        &self,
        status: ConversationStatus,
    ) -> Result<Vec<ConversationState>, StoreError> {
        Ok(self.db.list_by_status(status)?)
    }

    async fn list_log_entries(&self, conversation_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.db.list_log_entries(conversation_id)?)
    }
}
