//! SQLite persistence for conversation state and the event log
//!
//! Three tables: `conversations` (one mutable row per conversation),
//! `conversation_assertions` (the append-only assertion log) and `event_log`
//! (every inbound and outbound event, keyed by conversation and sort key).

mod schema;

pub use schema::*;

use crate::events::{AssertionType, ConversationRef, DecisionType};
use crate::state_machine::{
    AssertionRecord, ConversationState, ConversationStatus, LastDecision, StatePatch,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Conversation row as stored, before typed decoding
struct StateRow {
    id: String,
    customer_id: String,
    organization_id: String,
    status: String,
    correlation_id: String,
    last_decision_type: Option<String>,
    last_decision_at: Option<String>,
    message_count: i64,
    responses_sent: i64,
    closed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

const STATE_COLUMNS: &str = "id, customer_id, organization_id, status, correlation_id, \
     last_decision_type, last_decision_at, message_count, responses_sent, closed_at, \
     created_at, updated_at";

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== State Operations ====================

    /// Get a conversation's state with its full assertion log
    pub fn get_state(&self, id: &str) -> DbResult<Option<ConversationState>> {
        let conn = self.conn()?;
        load_state(&conn, id)
    }

    /// Upsert. A new conversation is inserted as given; an existing row is
    /// merged so a stale writer cannot undo newer work: status only moves
    /// forward, counters never drop, the newer `lastDecision` wins and the
    /// earliest `createdAt`/`closedAt` are kept. Stored assertions are never
    /// rewritten; assertions not yet stored are appended in order.
    pub fn put_state(&self, state: &ConversationState) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, customer_id, organization_id, status, status_rank,
                 correlation_id, last_decision_type, last_decision_at, message_count,
                 responses_sent, closed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 status = CASE WHEN excluded.status_rank >= status_rank
                     THEN excluded.status ELSE status END,
                 status_rank = MAX(status_rank, excluded.status_rank),
                 correlation_id = CASE WHEN excluded.updated_at >= updated_at
                     THEN excluded.correlation_id ELSE correlation_id END,
                 last_decision_type = CASE WHEN excluded.last_decision_at IS NOT NULL
                         AND (last_decision_at IS NULL OR excluded.last_decision_at >= last_decision_at)
                     THEN excluded.last_decision_type ELSE last_decision_type END,
                 last_decision_at = CASE WHEN excluded.last_decision_at IS NOT NULL
                         AND (last_decision_at IS NULL OR excluded.last_decision_at >= last_decision_at)
                     THEN excluded.last_decision_at ELSE last_decision_at END,
                 message_count = MAX(message_count, excluded.message_count),
                 responses_sent = MAX(responses_sent, excluded.responses_sent),
                 closed_at = COALESCE(closed_at, excluded.closed_at),
                 created_at = MIN(created_at, excluded.created_at),
                 updated_at = MAX(updated_at, excluded.updated_at)",
            params![
                state.conversation.id,
                state.conversation.customer_id,
                state.conversation.organization_id,
                state.status.as_str(),
                state.status.rank(),
                state.correlation_id,
                state.last_decision.map(|d| d.decision_type.as_str()),
                state.last_decision.map(|d| format_datetime(d.made_at)),
                to_sql_count(state.message_count),
                to_sql_count(state.responses_sent),
                state.closed_at.map(format_datetime),
                format_datetime(state.created_at),
                format_datetime(state.updated_at),
            ],
        )?;
        for record in &state.assertions {
            append_assertion(&tx, state.id(), record)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Translate a typed patch into one guarded UPDATE plus an optional
    /// assertion append, in a single transaction.
    ///
    /// The patch's command id and assertion are recorded first. If either was
    /// already there the patch is a replay and its counter increments are
    /// dropped.
    pub fn update_state(&self, id: &str, patch: &StatePatch) -> DbResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut fresh = true;
        if let Some(command_id) = patch.command_id {
            fresh &= tx.execute(
                "INSERT OR IGNORE INTO conversation_commands (conversation_id, command_id)
                 VALUES (?1, ?2)",
                params![id, command_id.to_string()],
            )? > 0;
        }
        if let Some(record) = &patch.append_assertion {
            fresh &= append_assertion(&tx, id, record)?;
        }
        let replay;
        let patch = if fresh {
            patch
        } else {
            tracing::debug!(conversation_id = %id, "Replayed patch, counters left alone");
            replay = patch.as_replay();
            &replay
        };

        let (sets, mut values) = assignments(patch);
        if sets.is_empty() {
            let exists = tx
                .query_row("SELECT 1 FROM conversations WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?;
            if exists.is_none() {
                return Err(DbError::NotFound(id.to_string()));
            }
        } else {
            let sql = format!("UPDATE conversations SET {} WHERE id = ?", sets.join(", "));
            values.push(SqlValue::Text(id.to_string()));
            let changed = tx.execute(&sql, params_from_iter(values))?;
            if changed == 0 {
                return Err(DbError::NotFound(id.to_string()));
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Conversations whose latest correlation id is `correlation_id`
    pub fn find_by_correlation_id(&self, correlation_id: &str) -> DbResult<Vec<ConversationState>> {
        let conn = self.conn()?;
        let ids = select_ids(
            &conn,
            "SELECT id FROM conversations WHERE correlation_id = ?1 ORDER BY updated_at DESC",
            correlation_id,
        )?;
        load_all(&conn, &ids)
    }

    /// Conversations in `status`, most recently updated first
    pub fn list_by_status(&self, status: ConversationStatus) -> DbResult<Vec<ConversationState>> {
        let conn = self.conn()?;
        let ids = select_ids(
            &conn,
            "SELECT id FROM conversations WHERE status = ?1 ORDER BY updated_at DESC",
            status.as_str(),
        )?;
        load_all(&conn, &ids)
    }

    // ==================== Event Log Operations ====================

    /// Insert unless `(conversation_id, sort_key)` or the payload's event id
    /// is already logged for the conversation
    pub fn append_log_entry(
        &self,
        conversation_id: &str,
        sort_key: &str,
        payload: &serde_json::Value,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        let event_id = payload.get("id").and_then(serde_json::Value::as_str);
        let event_type = payload.get("type").and_then(serde_json::Value::as_str);
        let payload_str = serde_json::to_string(payload)?;
        conn.execute(
            "INSERT OR IGNORE INTO event_log (conversation_id, sort_key, event_id, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![conversation_id, sort_key, event_id, event_type, payload_str],
        )?;
        Ok(())
    }

    /// Log entries for a conversation in sort-key order
    pub fn list_log_entries(&self, conversation_id: &str) -> DbResult<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sort_key, payload FROM event_log WHERE conversation_id = ?1 ORDER BY sort_key",
        )?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(sort_key, payload)| {
                Ok(LogEntry {
                    conversation_id: conversation_id.to_string(),
                    sort_key,
                    payload: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }
}

/// SET clauses and their bound values for the scalar fields of `patch`
fn assignments(patch: &StatePatch) -> (Vec<&'static str>, Vec<SqlValue>) {
    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(status) = patch.status {
        let rank = i64::from(status.rank());
        sets.push("status = CASE WHEN status_rank <= ? THEN ? ELSE status END");
        values.push(SqlValue::Integer(rank));
        values.push(SqlValue::Text(status.as_str().to_string()));
        sets.push("status_rank = MAX(status_rank, ?)");
        values.push(SqlValue::Integer(rank));
        if status == ConversationStatus::Closed {
            sets.push("closed_at = COALESCE(closed_at, ?)");
            values.push(SqlValue::Text(format_datetime(
                patch.updated_at.unwrap_or_else(Utc::now),
            )));
        }
    }
    if let Some(correlation_id) = &patch.correlation_id {
        sets.push("correlation_id = ?");
        values.push(SqlValue::Text(correlation_id.clone()));
    }
    if let Some(decision) = patch.last_decision {
        sets.push("last_decision_type = ?");
        values.push(SqlValue::Text(decision.decision_type.as_str().to_string()));
        sets.push("last_decision_at = ?");
        values.push(SqlValue::Text(format_datetime(decision.made_at)));
    }
    if let Some(n) = patch.add_messages {
        sets.push("message_count = message_count + ?");
        values.push(SqlValue::Integer(to_sql_count(n)));
    }
    if let Some(n) = patch.add_responses_sent {
        sets.push("responses_sent = responses_sent + ?");
        values.push(SqlValue::Integer(to_sql_count(n)));
    }
    if let Some(at) = patch.updated_at {
        sets.push("updated_at = MAX(created_at, ?)");
        values.push(SqlValue::Text(format_datetime(at)));
    }
    (sets, values)
}

/// Appends at the next position; a second append of the same assertion id is
/// ignored. Returns whether a row was added.
fn append_assertion(tx: &Transaction<'_>, conversation_id: &str, record: &AssertionRecord) -> DbResult<bool> {
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO conversation_assertions
             (conversation_id, position, assertion_id, assertion_type, agent_id, confidence, received_at)
         SELECT ?1, COALESCE(MAX(position), -1) + 1, ?2, ?3, ?4, ?5, ?6
         FROM conversation_assertions WHERE conversation_id = ?1",
        params![
            conversation_id,
            record.id.to_string(),
            record.assertion_type.as_str(),
            record.agent_id,
            record.confidence,
            format_datetime(record.received_at),
        ],
    )?;
    Ok(inserted > 0)
}

fn select_ids(conn: &Connection, sql: &str, arg: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params![arg], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn load_all(conn: &Connection, ids: &[String]) -> DbResult<Vec<ConversationState>> {
    let mut states = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(state) = load_state(conn, id)? {
            states.push(state);
        }
    }
    Ok(states)
}

fn load_state(conn: &Connection, id: &str) -> DbResult<Option<ConversationState>> {
    let row = conn
        .query_row(
            &format!("SELECT {STATE_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
            |row| {
                Ok(StateRow {
                    id: row.get(0)?,
                    customer_id: row.get(1)?,
                    organization_id: row.get(2)?,
                    status: row.get(3)?,
                    correlation_id: row.get(4)?,
                    last_decision_type: row.get(5)?,
                    last_decision_at: row.get(6)?,
                    message_count: row.get(7)?,
                    responses_sent: row.get(8)?,
                    closed_at: row.get(9)?,
                    created_at: row.get(10)?,
                    updated_at: row.get(11)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };

    let assertions = load_assertions(conn, id)?;
    decode_state(row, assertions).map(Some)
}

fn load_assertions(conn: &Connection, id: &str) -> DbResult<Vec<AssertionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT assertion_id, assertion_type, agent_id, confidence, received_at
         FROM conversation_assertions WHERE conversation_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(assertion_id, assertion_type, agent_id, confidence, received_at)| {
            Ok(AssertionRecord {
                id: assertion_id
                    .parse()
                    .map_err(|e| DbError::Corrupt(format!("assertion id {assertion_id}: {e}")))?,
                assertion_type: AssertionType::from(assertion_type),
                agent_id,
                confidence,
                received_at: parse_datetime(&received_at)?,
            })
        })
        .collect()
}

fn decode_state(row: StateRow, assertions: Vec<AssertionRecord>) -> DbResult<ConversationState> {
    let status = row
        .status
        .parse::<ConversationStatus>()
        .map_err(DbError::Corrupt)?;
    let last_decision = match (row.last_decision_type, row.last_decision_at) {
        (Some(kind), Some(at)) => Some(LastDecision {
            decision_type: DecisionType::from_name(&kind)
                .ok_or_else(|| DbError::Corrupt(format!("unknown decision type {kind}")))?,
            made_at: parse_datetime(&at)?,
        }),
        _ => None,
    };

    Ok(ConversationState {
        conversation: ConversationRef::new(row.id, row.customer_id, row.organization_id),
        status,
        correlation_id: row.correlation_id,
        assertions,
        last_decision,
        message_count: from_sql_count(row.message_count),
        responses_sent: from_sql_count(row.responses_sent),
        closed_at: row.closed_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

/// Fixed-width UTC form so stored timestamps compare correctly as text
fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("timestamp {s}: {e}")))
}

fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use uuid::Uuid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap()
    }

    fn conv(id: &str) -> ConversationRef {
        ConversationRef::new(id, "cust-1", "org-1")
    }

    fn record(secs: i64) -> AssertionRecord {
        AssertionRecord {
            id: Uuid::new_v4(),
            assertion_type: AssertionType::ResponseRecommendation,
            agent_id: "response-recommendation-agent".to_string(),
            confidence: 0.75,
            received_at: t(secs),
        }
    }

    #[test]
    fn test_put_and_get_state() {
        let db = Database::open_in_memory().unwrap();
        let mut state = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-1", t(0));
        state.message_count = 1;
        state.assertions.push(record(1));
        db.put_state(&state).unwrap();

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched, state);
        assert!(db.get_state("missing").unwrap().is_none());
    }

    #[test]
    fn test_put_never_rewrites_stored_assertions() {
        let db = Database::open_in_memory().unwrap();
        let first = record(1);
        let mut state = ConversationState::new(conv("conv-1"), ConversationStatus::Active, "corr-1", t(0));
        state.assertions.push(first.clone());
        db.put_state(&state).unwrap();

        let mut rewritten = state.clone();
        rewritten.assertions[0].confidence = 0.1;
        rewritten.assertions.push(record(2));
        db.put_state(&rewritten).unwrap();

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.assertions.len(), 2);
        assert_eq!(fetched.assertions[0], first);
    }

    #[test]
    fn test_update_applies_patch() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-1", t(0));
        db.put_state(&state).unwrap();

        let appended = record(5);
        let patch = StatePatch {
            status: Some(ConversationStatus::Active),
            correlation_id: Some("corr-2".to_string()),
            last_decision: Some(LastDecision {
                decision_type: DecisionType::RespondToCustomer,
                made_at: t(5),
            }),
            add_messages: Some(2),
            add_responses_sent: Some(1),
            append_assertion: Some(appended.clone()),
            command_id: Some(Uuid::new_v4()),
            updated_at: Some(t(5)),
        };
        db.update_state("conv-1", &patch).unwrap();

        let mut expected = state.clone();
        patch.apply_to(&mut expected);
        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched, expected);
        assert_eq!(fetched.assertions, vec![appended]);
        assert_eq!(fetched.message_count, 2);
    }

    #[test]
    fn test_put_merges_into_newer_row() {
        let db = Database::open_in_memory().unwrap();
        let baseline = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-1", t(0));
        db.put_state(&baseline).unwrap();
        db.update_state(
            "conv-1",
            &StatePatch {
                status: Some(ConversationStatus::Closed),
                last_decision: Some(LastDecision {
                    decision_type: DecisionType::RespondToCustomer,
                    made_at: t(4),
                }),
                add_messages: Some(2),
                add_responses_sent: Some(1),
                updated_at: Some(t(4)),
                ..StatePatch::default()
            },
        )
        .unwrap();

        // A writer that read before the row existed puts its own baseline late
        let stale = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-0", t(1));
        db.put_state(&stale).unwrap();

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Closed);
        assert_eq!(fetched.closed_at, Some(t(4)));
        assert_eq!(fetched.message_count, 2);
        assert_eq!(fetched.responses_sent, 1);
        assert_eq!(fetched.correlation_id, "corr-1");
        assert_eq!(fetched.created_at, t(0));
        assert_eq!(fetched.updated_at, t(4));
        assert_eq!(
            fetched.last_decision.map(|d| d.decision_type),
            Some(DecisionType::RespondToCustomer)
        );
    }

    #[test]
    fn test_replayed_command_does_not_count_twice() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-1", t(0));
        db.put_state(&state).unwrap();

        let patch = StatePatch {
            add_messages: Some(1),
            command_id: Some(Uuid::new_v4()),
            updated_at: Some(t(2)),
            ..StatePatch::default()
        };
        db.update_state("conv-1", &patch).unwrap();
        db.update_state("conv-1", &patch).unwrap();
        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.message_count, 1);
        assert_eq!(fetched.updated_at, t(2));

        let next = StatePatch {
            command_id: Some(Uuid::new_v4()),
            ..patch
        };
        db.update_state("conv-1", &next).unwrap();
        assert_eq!(db.get_state("conv-1").unwrap().unwrap().message_count, 2);
    }

    #[test]
    fn test_replayed_assertion_does_not_count_twice() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-1", t(0));
        db.put_state(&state).unwrap();

        let patch = StatePatch {
            status: Some(ConversationStatus::Active),
            add_responses_sent: Some(1),
            append_assertion: Some(record(1)),
            ..StatePatch::default()
        };
        db.update_state("conv-1", &patch).unwrap();
        db.update_state("conv-1", &patch).unwrap();
        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.responses_sent, 1);
        assert_eq!(fetched.assertions.len(), 1);
    }

    #[test]
    fn test_update_refuses_backward_status() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Closed, "corr-1", t(0));
        db.put_state(&state).unwrap();

        let patch = StatePatch {
            status: Some(ConversationStatus::Active),
            updated_at: Some(t(10)),
            ..StatePatch::default()
        };
        db.update_state("conv-1", &patch).unwrap();

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Closed);
        assert_eq!(fetched.closed_at, Some(t(0)));
        assert_eq!(fetched.updated_at, t(10));
    }

    #[test]
    fn test_update_closing_sets_closed_at_once() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Active, "corr-1", t(0));
        db.put_state(&state).unwrap();

        for secs in [3, 7] {
            let patch = StatePatch {
                status: Some(ConversationStatus::Closed),
                updated_at: Some(t(secs)),
                ..StatePatch::default()
            };
            db.update_state("conv-1", &patch).unwrap();
        }

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Closed);
        assert_eq!(fetched.closed_at, Some(t(3)));
        assert_eq!(fetched.updated_at, t(7));
    }

    #[test]
    fn test_update_dedupes_assertion_ids() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Active, "corr-1", t(0));
        db.put_state(&state).unwrap();

        let rec = record(1);
        let patch = StatePatch {
            append_assertion: Some(rec.clone()),
            ..StatePatch::default()
        };
        db.update_state("conv-1", &patch).unwrap();
        db.update_state("conv-1", &patch).unwrap();
        db.update_state(
            "conv-1",
            &StatePatch {
                append_assertion: Some(record(2)),
                ..StatePatch::default()
            },
        )
        .unwrap();

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.assertions.len(), 2);
        assert_eq!(fetched.assertions[0], rec);
    }

    #[test]
    fn test_updated_at_never_precedes_created_at() {
        let db = Database::open_in_memory().unwrap();
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Waiting, "corr-1", t(100));
        db.put_state(&state).unwrap();

        let patch = StatePatch {
            updated_at: Some(t(100) - Duration::seconds(50)),
            ..StatePatch::default()
        };
        db.update_state("conv-1", &patch).unwrap();
        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.updated_at, fetched.created_at);
    }

    #[test]
    fn test_update_missing_conversation() {
        let db = Database::open_in_memory().unwrap();
        let patch = StatePatch {
            add_messages: Some(1),
            ..StatePatch::default()
        };
        assert!(matches!(
            db.update_state("nope", &patch),
            Err(DbError::NotFound(id)) if id == "nope"
        ));
        let append_only = StatePatch {
            append_assertion: Some(record(0)),
            ..StatePatch::default()
        };
        assert!(matches!(db.update_state("nope", &append_only), Err(DbError::NotFound(_))));
        // Empty patches never touch the store
        db.update_state("nope", &StatePatch::default()).unwrap();
    }

    #[test]
    fn test_secondary_indexes() {
        let db = Database::open_in_memory().unwrap();
        db.put_state(&ConversationState::new(conv("a"), ConversationStatus::Waiting, "corr-1", t(0)))
            .unwrap();
        db.put_state(&ConversationState::new(conv("b"), ConversationStatus::Active, "corr-1", t(1)))
            .unwrap();
        db.put_state(&ConversationState::new(conv("c"), ConversationStatus::Active, "corr-2", t(2)))
            .unwrap();

        let by_corr: Vec<String> = db
            .find_by_correlation_id("corr-1")
            .unwrap()
            .into_iter()
            .map(|s| s.conversation.id)
            .collect();
        assert_eq!(by_corr, vec!["b", "a"]);

        let active: Vec<String> = db
            .list_by_status(ConversationStatus::Active)
            .unwrap()
            .into_iter()
            .map(|s| s.conversation.id)
            .collect();
        assert_eq!(active, vec!["c", "b"]);
        assert!(db.list_by_status(ConversationStatus::Closed).unwrap().is_empty());
    }

    #[test]
    fn test_event_log_is_idempotent_and_ordered() {
        let db = Database::open_in_memory().unwrap();
        let later = json!({"type": "conversation.decision", "n": 2});
        let earlier = json!({"type": "assertion.created", "n": 1});
        db.append_log_entry("conv-1", "2024-05-01T10:00:01.000Z#b", &later).unwrap();
        db.append_log_entry("conv-1", "2024-05-01T10:00:00.000Z#a", &earlier).unwrap();
        db.append_log_entry("conv-1", "2024-05-01T10:00:00.000Z#a", &json!({"n": 99}))
            .unwrap();

        let entries = db.list_log_entries("conv-1").unwrap();
        assert_eq!(entries.len(), 2);

        // Same event logged again under a later timestamp
        let event = json!({"id": "3f1c0d9e-0000-5000-8000-000000000001", "type": "conversation.update"});
        db.append_log_entry("conv-1", "2024-05-01T10:00:02.000Z#x", &event).unwrap();
        db.append_log_entry("conv-1", "2024-05-01T10:00:09.000Z#x", &event).unwrap();
        assert_eq!(db.list_log_entries("conv-1").unwrap().len(), 3);
        assert_eq!(entries[0].payload, earlier);
        assert_eq!(entries[1].payload, later);
        assert!(db.list_log_entries("conv-2").unwrap().is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.db");
        let state = ConversationState::new(conv("conv-1"), ConversationStatus::Active, "corr-1", t(0));
        {
            let db = Database::open(&path).unwrap();
            db.put_state(&state).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_state("conv-1").unwrap(), Some(state));
    }

    #[test]
    fn test_unknown_assertion_type_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let mut state = ConversationState::new(conv("conv-1"), ConversationStatus::Active, "corr-1", t(0));
        let mut rec = record(1);
        rec.assertion_type = AssertionType::from("SENTIMENT_SHIFT".to_string());
        state.assertions.push(rec);
        db.put_state(&state).unwrap();

        let fetched = db.get_state("conv-1").unwrap().unwrap();
        assert_eq!(fetched.assertions[0].assertion_type.as_str(), "SENTIMENT_SHIFT");
    }
}
