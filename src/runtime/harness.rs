//! Batch delivery harness
//!
//! Records sharing a partition key (the conversation id) run one after
//! another in delivery order; different keys run concurrently. Each outcome
//! is classified independently. Poison records are skipped; any transient
//! failure fails the whole batch so the broker redelivers it.

use super::error::{BatchError, RecordFailure};
use super::traits::Stage;
use crate::broker::BrokerRecord;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Processed,
    /// Poison record, dropped without retry
    Skipped,
    /// Transient failure, batch must be redelivered
    Failed(String),
}

/// Counts for a batch that may be acknowledged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

async fn process_record<S: Stage + ?Sized>(stage: &S, record: &BrokerRecord) -> RecordOutcome {
    match stage.process(record).await {
        Ok(()) => RecordOutcome::Processed,
        Err(e) if e.is_poison() => {
            tracing::warn!(
                stage = stage.name(),
                record = %record.position(),
                error = %e,
                "Dropping poison record"
            );
            RecordOutcome::Skipped
        }
        Err(e) => {
            tracing::error!(
                stage = stage.name(),
                record = %record.position(),
                error = %e,
                "Record failed, batch will be redelivered"
            );
            RecordOutcome::Failed(e.to_string())
        }
    }
}

/// Record indexes grouped by partition key, each group in delivery order.
/// A record without a readable key is a group of its own.
fn key_groups(records: &[BrokerRecord]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        match record.decode_key() {
            Ok(Some(key)) => {
                let slot = *by_key.entry(key).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[slot].push(index);
            }
            _ => groups.push(vec![index]),
        }
    }
    groups
}

/// Run one key's records in order. After a transient failure the rest of the
/// group is held back so that redelivery replays it in order.
async fn process_group<S: Stage + ?Sized>(
    stage: &S,
    records: &[BrokerRecord],
    group: &[usize],
) -> Vec<(usize, RecordOutcome)> {
    let mut outcomes = Vec::with_capacity(group.len());
    let mut blocked_by: Option<i64> = None;
    for &index in group {
        let record = &records[index];
        let outcome = match blocked_by {
            Some(offset) => RecordOutcome::Failed(format!(
                "held back behind failed record at offset {offset}"
            )),
            None => process_record(stage, record).await,
        };
        if blocked_by.is_none() && matches!(outcome, RecordOutcome::Failed(_)) {
            blocked_by = Some(record.offset);
        }
        outcomes.push((index, outcome));
    }
    outcomes
}

/// Run `stage` over every record and fold the outcomes.
///
/// A failure never stops records under other keys.
pub async fn process_batch<S: Stage + ?Sized>(
    stage: &S,
    records: &[BrokerRecord],
) -> Result<BatchReport, BatchError> {
    let groups = key_groups(records);
    let mut indexed: Vec<(usize, RecordOutcome)> =
        join_all(groups.iter().map(|group| process_group(stage, records, group)))
            .await
            .into_iter()
            .flatten()
            .collect();
    indexed.sort_by_key(|(index, _)| *index);
    let outcomes = indexed.into_iter().map(|(_, outcome)| outcome);

    let mut report = BatchReport::default();
    let mut failures = Vec::new();
    for (record, outcome) in records.iter().zip(outcomes) {
        match outcome {
            RecordOutcome::Processed => report.processed += 1,
            RecordOutcome::Skipped => report.skipped += 1,
            RecordOutcome::Failed(error) => failures.push(RecordFailure {
                topic: record.topic.clone(),
                partition: record.partition,
                offset: record.offset,
                error,
            }),
        }
    }

    tracing::info!(
        stage = stage.name(),
        records = records.len(),
        processed = report.processed,
        skipped = report.skipped,
        failed = failures.len(),
        "Batch complete"
    );

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(BatchError::RecordsFailed { failures })
    }
}
