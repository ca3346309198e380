use chrono::{DateTime, Utc};
use uuid::Uuid;

use mdm_core::types::{FieldHistoryEntry, GoldenRecord, MergeEvent, RecordId, Xref};

/// Accumulates writes for one merge before they are applied atomically.
/// Mirrors the spec's `begin() / upsert_golden / upsert_xref /
/// append_event / commit` write API.
#[derive(Debug, Default)]
pub struct Transaction {
    pub(crate) golden_records: Vec<GoldenRecord>,
    pub(crate) deleted_goldens: Vec<Uuid>,
    pub(crate) xrefs: Vec<Xref>,
    pub(crate) closes: Vec<(RecordId, DateTime<Utc>)>,
    pub(crate) events: Vec<MergeEvent>,
    pub(crate) field_history: Vec<FieldHistoryEntry>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_golden(&mut self, record: GoldenRecord) -> &mut Self {
        self.golden_records.push(record);
        self
    }

    /// Removes a golden record entirely, used by `SPLIT` (rollback/rebuild)
    /// rather than `MERGE`'s golden_id reassignment.
    pub fn delete_golden(&mut self, golden_id: Uuid) -> &mut Self {
        self.deleted_goldens.push(golden_id);
        self
    }

    pub fn upsert_xref(&mut self, xref: Xref) -> &mut Self {
        self.xrefs.push(xref);
        self
    }

    /// Closes `source_record_id`'s current xref (sets `valid_to`) without
    /// opening a replacement row.
    pub fn close_xref(&mut self, source_record_id: RecordId, at: DateTime<Utc>) -> &mut Self {
        self.closes.push((source_record_id, at));
        self
    }

    pub fn append_event(&mut self, event: MergeEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    pub fn append_field_history(&mut self, entry: FieldHistoryEntry) -> &mut Self {
        self.field_history.push(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.golden_records.is_empty()
            && self.deleted_goldens.is_empty()
            && self.xrefs.is_empty()
            && self.closes.is_empty()
            && self.events.is_empty()
            && self.field_history.is_empty()
    }
}
