//! The JSON shape stored in `MergeEvent::before_state`/`after_state`.
//!
//! Kept as a plain, `serde_json`-serializable struct rather than a trait
//! object: the lineage sink never needs to interpret a snapshot's contents
//! beyond replaying it verbatim during rollback, so the on-disk (or
//! in-memory) representation and the in-process type are the same value.

use serde::{Deserialize, Serialize};

use mdm_core::types::{GoldenRecord, Xref};

/// Everything needed to restore the golden records and xref rows touched
/// by one [`crate::Transaction`] to their state immediately before it
/// committed (or, for `after_state`, immediately after).
///
/// `goldens` carries one entry per affected `golden_id`; `None` means the
/// golden record did not exist at that point in time (so rolling back a
/// `CREATE` deletes it). `xrefs` carries the *complete* historical xref
/// list for every `source_record_id` touched, since a rollback must also
/// reopen a closed interval on the previously-current row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub goldens: Vec<(uuid::Uuid, Option<GoldenRecord>)>,
    pub xrefs: Vec<(String, Vec<Xref>)>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_golden(mut self, golden_id: uuid::Uuid, record: Option<GoldenRecord>) -> Self {
        self.goldens.push((golden_id, record));
        self
    }

    pub fn with_xref_history(mut self, source_record_id: String, history: Vec<Xref>) -> Self {
        self.xrefs.push((source_record_id, history));
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
