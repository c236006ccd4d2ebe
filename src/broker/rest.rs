//! REST-proxy producer
//!
//! Publishes through a Kafka REST proxy (v2 API, binary embedded format):
//! `POST {broker_url}/topics/{topic}` with base64 key and value.

use super::pool::ProducerPool;
use crate::runtime::{PublishError, Publisher};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONTENT_TYPE: &str = "application/vnd.kafka.binary.v2+json";
const ACCEPT: &str = "application/vnd.kafka.v2+json";

pub struct RestProducer {
    client: Client,
    base_url: String,
    client_id: String,
}

impl RestProducer {
    pub fn new(client: Client, broker_url: &str, client_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: broker_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{topic}", self.base_url)
    }

    fn encode(partition_key: &str, payload: &[u8]) -> ProduceRequest {
        ProduceRequest {
            records: vec![ProduceRecord {
                key: BASE64.encode(partition_key),
                value: BASE64.encode(payload),
            }],
        }
    }
}

impl ProducerPool<RestProducer> {
    /// Pool whose producers share one HTTP client against `broker_url`
    pub fn rest(broker_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(format!("Failed to create HTTP client: {e}")))?;
        let broker_url = broker_url.to_string();
        Ok(ProducerPool::new(move |client_id: &str| {
            Ok(RestProducer::new(client.clone(), &broker_url, client_id))
        }))
    }
}

#[async_trait]
impl Publisher for RestProducer {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.topic_url(topic))
            .header("content-type", CONTENT_TYPE)
            .header("accept", ACCEPT)
            .json(&Self::encode(partition_key, payload))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PublishError::Transport(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    PublishError::Transport(format!("Connection failed: {e}"))
                } else {
                    PublishError::Transport(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PublishError::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        check_offsets(topic, status.as_u16(), &body)?;
        tracing::debug!(
            client_id = %self.client_id,
            topic,
            conversation_id = partition_key,
            "Broker acknowledged record"
        );
        Ok(())
    }
}

/// A 200 can still carry per-record errors in the offsets array
fn check_offsets(topic: &str, status: u16, body: &str) -> Result<(), PublishError> {
    let Ok(parsed) = serde_json::from_str::<ProduceResponse>(body) else {
        return Ok(());
    };
    match parsed.offsets.into_iter().find_map(|o| o.error) {
        Some(error) => Err(PublishError::Rejected {
            topic: topic.to_string(),
            status,
            body: error,
        }),
        None => Ok(()),
    }
}

// REST proxy API types

#[derive(Debug, Serialize)]
struct ProduceRequest {
    records: Vec<ProduceRecord>,
}

#[derive(Debug, Serialize)]
struct ProduceRecord {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<ProduceOffset>,
}

#[derive(Debug, Deserialize)]
struct ProduceOffset {
    #[serde(default)]
    error: Option<String>,
}
