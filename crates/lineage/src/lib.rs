//! Lineage Store: the `golden_record`, `xref`, `merge_event`, and
//! `field_history` logical tables, an abstract `LineageSink` write API, and
//! an in-memory reference implementation with atomic per-golden_id commits
//! and reversible rollback.
//!
//! The `async_trait` + per-call I/O-boundary shape follows
//! `wp-labs-wp-reactor`'s connector trait; the retry/backoff shape follows
//! the teacher's `crates/cdp/src/connector_runtime.rs::RetryPolicy`.

mod memory;
mod retry;
mod snapshot;
mod transaction;

pub use memory::InMemoryLineageSink;
pub use retry::{commit_with_retry, RetryPolicy};
pub use snapshot::StateSnapshot;
pub use transaction::Transaction;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use mdm_core::error::MdmResult;
use mdm_core::types::{GoldenRecord, MergeEvent, RecordId, Xref};

#[async_trait]
pub trait LineageSink: Send + Sync {
    /// Opens a new, empty transaction. Pure in-memory bookkeeping; no lock
    /// is held until `commit`.
    async fn begin(&self) -> Transaction {
        Transaction::new()
    }

    /// Atomically applies every write staged in `txn`. Per the contract in
    /// §4.8, a reader never observes a partially applied merge: every
    /// golden_id touched by `txn` is locked for the duration of the commit.
    async fn commit(&self, txn: Transaction) -> MdmResult<()>;

    /// Rolls back every event from `to_event_id` (inclusive) to the most
    /// recent, applying each `before_state` in reverse chronological order.
    async fn rollback(&self, to_event_id: Uuid) -> MdmResult<()>;

    async fn get_golden(&self, golden_id: Uuid) -> MdmResult<Option<GoldenRecord>>;

    /// Lists every current golden record. Used by `rebuild` (to emit
    /// SPLIT events for prior state before re-ingesting) and by the CLI's
    /// `inspect` command family.
    async fn all_goldens(&self) -> MdmResult<Vec<GoldenRecord>>;

    async fn current_xref(&self, source_record_id: &RecordId) -> MdmResult<Option<Xref>>;

    /// Lists every source record id whose current xref points at
    /// `golden_id`. Used by the pipeline orchestrator to seed the
    /// union-find with a golden record's full membership (spec §4.9:
    /// incremental mode "co-ingests existing normalized records ... so
    /// cross-batch matches are found") without holding those members'
    /// raw attribute data in memory — only their ids.
    async fn current_members(&self, golden_id: Uuid) -> MdmResult<Vec<RecordId>>;

    /// Returns the complete historical xref row list for `source_record_id`,
    /// oldest first. Used by the pipeline orchestrator to build a
    /// `before_state`/`after_state` snapshot precise enough for `rollback`
    /// to reopen a closed interval rather than merely delete the latest row.
    async fn xref_history_for(&self, source_record_id: &RecordId) -> MdmResult<Vec<Xref>>;

    async fn events(&self) -> MdmResult<Vec<MergeEvent>>;

    /// Traverses xref and explicit inter-entity relations reachable from
    /// `golden_id` as of `at_time`, filtered to `relation_type`. The
    /// in-memory reference implementation only knows the `"xref"` relation
    /// (a golden_id related to itself via its own current member set), so
    /// any other `relation_type` returns an empty result rather than an
    /// error — consistent with "never cached across batches" in §9: there
    /// is no persisted inter-entity relation graph to traverse yet.
    async fn related_entities(
        &self,
        golden_id: Uuid,
        relation_type: &str,
        at_time: DateTime<Utc>,
    ) -> MdmResult<Vec<Uuid>>;

    /// Returns the full `field_history` rows recorded for `golden_id`,
    /// oldest first.
    async fn field_history(&self, golden_id: Uuid) -> MdmResult<Vec<mdm_core::types::FieldHistoryEntry>>;
}
