//! Ingestion I/O boundary and dead-letter sink for records a stage could not
//! process. `DeadLetterQueue`'s bounded, oldest-eviction `VecDeque` shape is
//! lifted directly from the teacher's
//! `crates/cdp/src/connector_runtime.rs::DeadLetterQueue`; here it captures
//! pipeline-stage failures instead of connector-call failures.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use mdm_core::error::MdmResult;
use mdm_core::types::Record;

/// Produces the batch of source records a pipeline run should ingest.
/// Implementors own whatever connection or file handle backs the batch; the
/// orchestrator only ever sees `Record`s.
#[async_trait]
pub trait IngestionSource: Send + Sync {
    async fn fetch_batch(&self) -> MdmResult<Vec<Record>>;
}

/// An in-memory source wrapping a fixed `Vec<Record>`, used by the CLI's
/// file-backed ingestion path (records parsed up front) and by tests.
pub struct VecIngestionSource {
    records: Vec<Record>,
}

impl VecIngestionSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl IngestionSource for VecIngestionSource {
    async fn fetch_batch(&self) -> MdmResult<Vec<Record>> {
        Ok(self.records.clone())
    }
}

/// A record that failed at some stage, with enough context to diagnose and
/// replay it.
#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub stage: String,
    pub record_id: String,
    pub source_id: String,
    /// Short, stable classification (e.g. `VALIDATION_ERROR`,
    /// `BLOCK_EXPLOSION`) from [`mdm_core::error::MdmError::dead_letter_reason`].
    pub reason: &'static str,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Sink for records a stage refused to process (a comparator error that
/// survived retries, a malformed source record, a blocked-explosion refusal
/// that falls back to per-record isolation). Never blocks the batch: a
/// dead-lettered record is simply excluded from clustering/survivorship.
pub trait DeadLetterSink: Send + Sync {
    fn enqueue(&self, record: DeadLetterRecord);
    fn peek(&self, limit: usize) -> Vec<DeadLetterRecord>;
    fn depth(&self) -> usize;
}

/// Bounded, oldest-eviction dead-letter queue.
pub struct InMemoryDeadLetterSink {
    records: Mutex<VecDeque<DeadLetterRecord>>,
    max_size: usize,
}

impl InMemoryDeadLetterSink {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_size,
        }
    }
}

impl Default for InMemoryDeadLetterSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn enqueue(&self, record: DeadLetterRecord) {
        let mut queue = self.records.lock();
        if queue.len() >= self.max_size {
            queue.pop_front();
        }
        queue.push_back(record);
    }

    fn peek(&self, limit: usize) -> Vec<DeadLetterRecord> {
        self.records.lock().iter().take(limit).cloned().collect()
    }

    fn depth(&self) -> usize {
        self.records.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dead_letter(id: u8) -> DeadLetterRecord {
        DeadLetterRecord {
            id: Uuid::new_v4(),
            stage: "preprocess".to_string(),
            record_id: id.to_string(),
            source_id: "crm".to_string(),
            reason: "VALIDATION_ERROR",
            error: "bad input".to_string(),
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn oldest_is_evicted_past_capacity() {
        let sink = InMemoryDeadLetterSink::new(3);
        for i in 0..4 {
            sink.enqueue(dead_letter(i));
        }
        assert_eq!(sink.depth(), 3);
        let remaining = sink.peek(10);
        assert_eq!(remaining[0].record_id, "1");
    }

    #[tokio::test]
    async fn vec_source_returns_its_records() {
        let record = Record {
            record_id: "r1".to_string(),
            source_id: "crm".to_string(),
            attributes: Default::default(),
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        };
        let source = VecIngestionSource::new(vec![record.clone()]);
        let batch = source.fetch_batch().await.unwrap();
        assert_eq!(batch, vec![record]);
    }
}
