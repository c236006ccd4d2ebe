//! Database schema and row types

use serde::Serialize;
use serde_json::Value;

/// SQL schema for initialization
///
/// `status_rank` mirrors `status` (WAITING=0, ACTIVE=1, CLOSED=2) so partial
/// updates can refuse backward moves inside a single statement.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'WAITING',
    status_rank INTEGER NOT NULL DEFAULT 0,
    correlation_id TEXT NOT NULL,
    last_decision_type TEXT,
    last_decision_at TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    responses_sent INTEGER NOT NULL DEFAULT 0,
    closed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_correlation ON conversations(correlation_id);
CREATE INDEX IF NOT EXISTS idx_conversations_status ON conversations(status, updated_at DESC);

CREATE TABLE IF NOT EXISTS conversation_assertions (
    conversation_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    assertion_id TEXT NOT NULL,
    assertion_type TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    confidence REAL NOT NULL,
    received_at TEXT NOT NULL,

    PRIMARY KEY (conversation_id, position),
    UNIQUE (conversation_id, assertion_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

-- Commands whose counter increments have been applied
CREATE TABLE IF NOT EXISTS conversation_commands (
    conversation_id TEXT NOT NULL,
    command_id TEXT NOT NULL,

    PRIMARY KEY (conversation_id, command_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE TABLE IF NOT EXISTS event_log (
    conversation_id TEXT NOT NULL,
    sort_key TEXT NOT NULL,
    event_id TEXT,
    event_type TEXT,
    payload TEXT NOT NULL,

    PRIMARY KEY (conversation_id, sort_key)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_event_log_event ON event_log(conversation_id, event_id);
";

/// One audit-log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub conversation_id: String,
    pub sort_key: String,
    pub payload: Value,
}
