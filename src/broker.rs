//! Message broker plumbing
//!
//! Inbound: broker-native trigger batches decoded into `BrokerRecord`s.
//! Outbound: a pool of REST-proxy producers, one per logical client id.

mod pool;
mod record;
mod rest;

pub use pool::{PooledPublisher, ProducerPool};
pub use record::{BrokerRecord, RecordError, TriggerBatch};

use std::fmt;

/// Logical outbound topics; physical names come from `TopicMap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundTopic {
    Evaluations,
    Assertions,
    Updates,
    Decisions,
}

impl OutboundTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboundTopic::Evaluations => "evaluations",
            OutboundTopic::Assertions => "assertions",
            OutboundTopic::Updates => "updates",
            OutboundTopic::Decisions => "decisions",
        }
    }
}

impl fmt::Display for OutboundTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical topic name for each logical topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    pub evaluations: String,
    pub assertions: String,
    pub updates: String,
    pub decisions: String,
}

impl TopicMap {
    pub fn name(&self, topic: OutboundTopic) -> &str {
        match topic {
            OutboundTopic::Evaluations => &self.evaluations,
            OutboundTopic::Assertions => &self.assertions,
            OutboundTopic::Updates => &self.updates,
            OutboundTopic::Decisions => &self.decisions,
        }
    }
}

impl Default for TopicMap {
    fn default() -> Self {
        Self {
            evaluations: "conversation-evaluations".to_string(),
            assertions: "conversation-assertions".to_string(),
            updates: "conversation-updates".to_string(),
            decisions: "conversation-decisions".to_string(),
        }
    }
}
