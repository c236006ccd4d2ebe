//! Inbound trigger batches
//!
//! The broker trigger delivers `{eventSource?, records: {"<topic>-<partition>": [...]}}`
//! with base64 keys and values. Values are decoded per record so that one bad
//! record cannot poison its siblings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record {field} is not valid base64: {detail}")]
    InvalidBase64 { field: &'static str, detail: String },
}

/// One record as delivered by the broker trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Base64 partition key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Base64 payload
    pub value: String,
}

impl BrokerRecord {
    /// Record carrying `payload`, encoded the way the trigger delivers it
    pub fn from_payload(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<&str>,
        payload: &[u8],
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            timestamp: None,
            key: key.map(|k| BASE64.encode(k)),
            value: BASE64.encode(payload),
        }
    }

    pub fn decode_value(&self) -> Result<Vec<u8>, RecordError> {
        BASE64
            .decode(self.value.as_bytes())
            .map_err(|e| RecordError::InvalidBase64 {
                field: "value",
                detail: e.to_string(),
            })
    }

    pub fn decode_key(&self) -> Result<Option<String>, RecordError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(key.as_bytes())
            .map_err(|e| RecordError::InvalidBase64 {
                field: "key",
                detail: e.to_string(),
            })?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// `topic/partition@offset`, for logs
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,
    #[serde(default)]
    pub records: BTreeMap<String, Vec<BrokerRecord>>,
}

impl TriggerBatch {
    /// Single-partition batch, mainly for tests and replay tooling
    pub fn from_records(records: Vec<BrokerRecord>) -> Self {
        let mut grouped: BTreeMap<String, Vec<BrokerRecord>> = BTreeMap::new();
        for record in records {
            grouped
                .entry(format!("{}-{}", record.topic, record.partition))
                .or_default()
                .push(record);
        }
        Self {
            event_source: None,
            records: grouped,
        }
    }

    /// All records, grouped by partition key then in delivery order
    pub fn into_records(self) -> Vec<BrokerRecord> {
        self.records.into_values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
