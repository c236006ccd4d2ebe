//! Schema validation for inbound payloads

use super::envelope::{ConversationRef, EventEnvelope, EventMetadata, EventType};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why a payload was rejected. Every variant is permanent: retrying the same
/// bytes cannot succeed.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("payload is not valid JSON: {0}")]
    NotJson(String),
    #[error("payload does not match {shape}: {detail}")]
    Shape { shape: &'static str, detail: String },
    #[error("unknown event type {0:?}")]
    UnknownType(String),
    #[error("unexpected event type {found}, expected {expected}")]
    UnexpectedType {
        expected: &'static str,
        found: EventType,
    },
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(String),
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

#[derive(Deserialize)]
struct TypeHeader {
    #[serde(rename = "type")]
    event_type: String,
}

/// Parse raw bytes and read the envelope `type` without committing to a shape
pub(crate) fn read_header(payload: &[u8]) -> Result<(EventType, Value), SchemaError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| SchemaError::NotJson(e.to_string()))?;
    let header: TypeHeader = serde_json::from_value(value.clone()).map_err(|e| SchemaError::Shape {
        shape: "event envelope",
        detail: e.to_string(),
    })?;
    let event_type = header
        .event_type
        .parse::<EventType>()
        .map_err(|_| SchemaError::UnknownType(header.event_type))?;
    Ok((event_type, value))
}

pub(crate) fn decode_shape<T: DeserializeOwned>(
    value: Value,
    shape: &'static str,
) -> Result<T, SchemaError> {
    serde_json::from_value(value).map_err(|e| SchemaError::Shape {
        shape,
        detail: e.to_string(),
    })
}

/// Checks shared by every event: supported major version, non-empty identity
/// and correlation id.
pub(crate) fn check_common(
    envelope: &EventEnvelope,
    conversation: &ConversationRef,
    metadata: &EventMetadata,
) -> Result<(), SchemaError> {
    let major = envelope.schema_version.split('.').next().unwrap_or_default();
    if major != "1" {
        return Err(SchemaError::UnsupportedVersion(
            envelope.schema_version.clone(),
        ));
    }
    non_empty(&conversation.id, "conversation.id")?;
    non_empty(&conversation.customer_id, "conversation.customerId")?;
    non_empty(&conversation.organization_id, "conversation.organizationId")?;
    non_empty(&metadata.correlation_id, "metadata.correlationId")?;
    Ok(())
}

pub(crate) fn non_empty(value: &str, field: &'static str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        Err(SchemaError::EmptyField(field))
    } else {
        Ok(())
    }
}
