//! Mock implementations for testing
//!
//! These mocks let stages run end to end without a database, broker or LLM.

use super::error::{PublishError, StoreError};
use super::traits::{Publisher, StateStore};
use crate::db::LogEntry;
use crate::events::{
    Assertion, AssertionEvent, AssertionType, ConversationRef, EventMetadata,
};
use crate::llm::{ChatMessage, Completion, CompletionOptions, CompletionService, LlmError, TokenUsage};
use crate::state_machine::{ConversationState, ConversationStatus, StatePatch};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// In-memory State Store
// ============================================================================

/// State store backed by maps, with switchable failures
#[derive(Default)]
pub struct InMemoryStateStore {
    states: Mutex<HashMap<String, ConversationState>>,
    /// Command ids whose patch has been applied, per conversation
    commands: Mutex<HashSet<(String, Uuid)>>,
    log: Mutex<BTreeMap<(String, String), Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` directly, bypassing put semantics
    pub fn seed(&self, state: ConversationState) {
        self.states
            .lock()
            .unwrap()
            .insert(state.id().to_string(), state);
    }

    pub fn state(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states.lock().unwrap().get(conversation_id).cloned()
    }

    pub fn log_entries(&self, conversation_id: &str) -> Vec<LogEntry> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|((conv, _), _)| conv == conversation_id)
            .map(|((conv, key), payload)| LogEntry {
                conversation_id: conv.clone(),
                sort_key: key.clone(),
                payload: payload.clone(),
            })
            .collect()
    }

    /// `type` of every logged event for the conversation, in sort-key order
    pub fn logged_types(&self, conversation_id: &str) -> Vec<String> {
        self.log_entries(conversation_id)
            .into_iter()
            .filter_map(|e| e.payload["type"].as_str().map(String::from))
            .collect()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }

    fn matching(&self, pred: impl Fn(&ConversationState) -> bool) -> Vec<ConversationState> {
        let mut found: Vec<ConversationState> = self
            .states
            .lock()
            .unwrap()
            .values()
            .filter(|s| pred(s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        self.check_read()?;
        Ok(self.state(conversation_id))
    }

    async fn put(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.check_write()?;
        let mut states = self.states.lock().unwrap();
        match states.get_mut(state.id()) {
            Some(existing) => existing.merge(state),
            None => {
                states.insert(state.id().to_string(), state.clone());
            }
        }
        Ok(())
    }

    async fn update(&self, conversation_id: &str, patch: &StatePatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.check_write()?;
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        let replayed = patch.command_id.is_some_and(|id| {
            !self
                .commands
                .lock()
                .unwrap()
                .insert((conversation_id.to_string(), id))
        });
        if replayed {
            patch.as_replay().apply_to(state);
        } else {
            patch.apply_to(state);
        }
        Ok(())
    }

    async fn append_log_entry(
        &self,
        conversation_id: &str,
        sort_key: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let mut log = self.log.lock().unwrap();
        let event_id = payload.get("id");
        let seen = event_id.is_some()
            && log
                .iter()
                .any(|((conv, _), logged)| conv == conversation_id && logged.get("id") == event_id);
        if !seen {
            log.entry((conversation_id.to_string(), sort_key.to_string()))
                .or_insert_with(|| payload.clone());
        }
        Ok(())
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ConversationState>, StoreError> {
        self.check_read()?;
        Ok(self.matching(|s| s.correlation_id == correlation_id))
    }

    async fn list_by_status(
        &self,
        status: ConversationStatus,
    ) -> Result<Vec<ConversationState>, StoreError> {
        self.check_read()?;
        Ok(self.matching(|s| s.status == status))
    }

    async fn list_log_entries(&self, conversation_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        self.check_read()?;
        Ok(self.log_entries(conversation_id))
    }
}

// ============================================================================
// Recording Publisher
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub topic: String,
    pub partition_key: String,
    pub payload: Vec<u8>,
}

impl PublishedRecord {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

/// Publisher that records every acknowledged publish
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedRecord>>,
    failures_remaining: AtomicUsize,
    next_delay: Mutex<Option<Duration>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publishes with a transport error
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Hold the next publish for `delay` so other tasks get to run
    pub fn delay_next(&self, delay: Duration) {
        *self.next_delay.lock().unwrap() = Some(delay);
    }

    pub fn published(&self) -> Vec<PublishedRecord> {
        self.published.lock().unwrap().clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Value> {
        self.published()
            .iter()
            .filter(|r| r.topic == topic)
            .map(PublishedRecord::json)
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let delay = self.next_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError::Transport("injected publish failure".to_string()));
        }
        self.published.lock().unwrap().push(PublishedRecord {
            topic: topic.to_string(),
            partition_key: partition_key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

// ============================================================================
// Mock Completion Service
// ============================================================================

/// Completion service that returns queued responses
pub struct MockCompletionService {
    responses: Mutex<VecDeque<Result<Completion, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful completion with `content`
    pub fn queue_content(&self, content: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(Completion {
            content: content.into(),
            model: "mock-model".to_string(),
            token_usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        }));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockCompletionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), options.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Event fixtures
// ============================================================================

pub fn conversation(id: &str) -> ConversationRef {
    ConversationRef::new(id, "cust-1", "org-1")
}

pub fn assertion_event(
    conversation_id: &str,
    assertion_type: AssertionType,
    confidence: f64,
    recommendation: Option<&str>,
) -> AssertionEvent {
    AssertionEvent::new(
        conversation(conversation_id),
        EventMetadata::new("corr-1"),
        Assertion {
            assertion_type,
            confidence,
            reasoning: "fixture".to_string(),
            recommendation: recommendation.map(String::from),
            agent_id: "response-recommendation-agent".to_string(),
        },
    )
}
