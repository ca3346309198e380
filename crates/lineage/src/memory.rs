//! In-memory reference [`LineageSink`]: the logical `golden_record`, `xref`,
//! `merge_event`, and `field_history` tables backed by `dashmap`, with
//! per-golden_id locking (grounded in the teacher's `DashMap`-keyed
//! `ConnectorRegistry`) standing in for row-level locking a database-backed
//! sink would provide natively.
//!
//! Used by the CLI's default configuration and by the integration tests so
//! the whole pipeline can be exercised without external infrastructure, per
//! §4.8's "reference in-memory lineage sink" contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::{FieldHistoryEntry, GoldenRecord, MergeEvent, RecordId, Xref};

use crate::snapshot::StateSnapshot;
use crate::transaction::Transaction;
use crate::LineageSink;

#[derive(Default)]
pub struct InMemoryLineageSink {
    golden_records: DashMap<Uuid, GoldenRecord>,
    xref_history: DashMap<RecordId, Vec<Xref>>,
    events: Mutex<Vec<MergeEvent>>,
    field_history: DashMap<Uuid, Vec<FieldHistoryEntry>>,
    golden_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Held in write mode for the full duration of `commit`/`rollback`'s
    /// multi-table mutation, and in read mode by every read method, so a
    /// reader can never observe the sink between one table's write and the
    /// next. `golden_locks` above only serializes writers against each
    /// other (and orders them to avoid deadlock); it says nothing about
    /// concurrent readers, which is what this adds.
    consistency_lock: RwLock<()>,
}

impl InMemoryLineageSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, golden_id: Uuid) -> Arc<Mutex<()>> {
        self.golden_locks
            .entry(golden_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Locks every golden_id touched by `txn`, sorted ascending, so two
    /// concurrent commits that both touch golden_ids G1 and G2 always
    /// acquire them in the same order and cannot deadlock.
    fn affected_golden_ids(txn: &Transaction) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        ids.extend(txn.golden_records.iter().map(|g| g.golden_id));
        ids.extend(txn.deleted_goldens.iter().copied());
        ids.extend(txn.xrefs.iter().map(|x| x.golden_id));
        ids.extend(txn.events.iter().flat_map(|e| e.affected_golden_ids.clone()));
        ids.extend(txn.field_history.iter().map(|f| f.golden_id));
        ids.sort();
        ids.dedup();
        ids
    }

    fn current_xref_locked(&self, source_record_id: &str) -> Option<Xref> {
        self.xref_history
            .get(source_record_id)
            .and_then(|history| history.iter().find(|x| x.is_current()).cloned())
    }
}

#[async_trait]
impl LineageSink for InMemoryLineageSink {
    async fn commit(&self, txn: Transaction) -> MdmResult<()> {
        if txn.is_empty() {
            return Ok(());
        }

        let _consistency_guard = self.consistency_lock.write();
        let affected = Self::affected_golden_ids(&txn);
        let locks: Vec<Arc<Mutex<()>>> = affected.iter().map(|id| self.lock_for(*id)).collect();
        let _guards: Vec<_> = locks.iter().map(|l| l.lock()).collect();

        // Validate before mutating anything: a reader must never observe a
        // partially applied merge, so every check that can fail happens
        // before the first write.
        for golden in &txn.golden_records {
            if let Some(existing) = self.golden_records.get(&golden.golden_id) {
                if golden.version != existing.version + 1 {
                    return Err(MdmError::LineageConflict {
                        golden_id: golden.golden_id.to_string(),
                        reason: format!(
                            "expected version {} to supersede stored version {}",
                            golden.version, existing.version
                        ),
                    });
                }
            } else if golden.version != 1 {
                return Err(MdmError::LineageConflict {
                    golden_id: golden.golden_id.to_string(),
                    reason: format!(
                        "new golden record must start at version 1, got {}",
                        golden.version
                    ),
                });
            }
        }

        for golden in txn.golden_records {
            self.golden_records.insert(golden.golden_id, golden);
        }

        for golden_id in txn.deleted_goldens {
            self.golden_records.remove(&golden_id);
        }

        for xref in txn.xrefs {
            let mut history = self
                .xref_history
                .entry(xref.source_record_id.clone())
                .or_default();
            for prior in history.iter_mut() {
                if prior.is_current() && prior.golden_id != xref.golden_id {
                    prior.valid_to = Some(xref.valid_from);
                }
            }
            history.push(xref);
        }

        for (source_record_id, at) in txn.closes {
            if let Some(mut history) = self.xref_history.get_mut(&source_record_id) {
                for row in history.iter_mut() {
                    if row.is_current() {
                        row.valid_to = Some(at);
                    }
                }
            }
        }

        for entry in txn.field_history {
            self.field_history.entry(entry.golden_id).or_default().push(entry);
        }

        if !txn.events.is_empty() {
            let mut events = self.events.lock();
            events.extend(txn.events);
        }

        Ok(())
    }

    async fn rollback(&self, to_event_id: Uuid) -> MdmResult<()> {
        let _consistency_guard = self.consistency_lock.write();
        let tail: Vec<MergeEvent> = {
            let events = self.events.lock();
            match events.iter().position(|e| e.event_id == to_event_id) {
                Some(idx) => events[idx..].to_vec(),
                // Already rolled back (or never existed): idempotent no-op.
                None => return Ok(()),
            }
        };

        for event in tail.iter().rev() {
            let snapshot = StateSnapshot::from_json(&event.before_state).ok_or_else(|| {
                MdmError::Lineage(format!(
                    "event {} has an unparseable before_state snapshot",
                    event.event_id
                ))
            })?;

            let locks: Vec<Arc<Mutex<()>>> = event
                .affected_golden_ids
                .iter()
                .map(|id| self.lock_for(*id))
                .collect();
            let _guards: Vec<_> = locks.iter().map(|l| l.lock()).collect();

            for (golden_id, record) in &snapshot.goldens {
                match record {
                    Some(record) => {
                        self.golden_records.insert(*golden_id, record.clone());
                    }
                    None => {
                        self.golden_records.remove(golden_id);
                    }
                }
                if let Some(mut entries) = self.field_history.get_mut(golden_id) {
                    entries.retain(|e| e.observed_at < event.timestamp);
                }
            }

            for (source_record_id, history) in &snapshot.xrefs {
                self.xref_history
                    .insert(source_record_id.clone(), history.clone());
            }

            let mut events = self.events.lock();
            events.retain(|e| e.event_id != event.event_id);
        }

        Ok(())
    }

    async fn get_golden(&self, golden_id: Uuid) -> MdmResult<Option<GoldenRecord>> {
        let _guard = self.consistency_lock.read();
        Ok(self.golden_records.get(&golden_id).map(|r| r.clone()))
    }

    async fn all_goldens(&self) -> MdmResult<Vec<GoldenRecord>> {
        let _guard = self.consistency_lock.read();
        Ok(self.golden_records.iter().map(|r| r.clone()).collect())
    }

    async fn current_xref(&self, source_record_id: &RecordId) -> MdmResult<Option<Xref>> {
        let _guard = self.consistency_lock.read();
        Ok(self.current_xref_locked(source_record_id))
    }

    async fn current_members(&self, golden_id: Uuid) -> MdmResult<Vec<RecordId>> {
        let _guard = self.consistency_lock.read();
        let mut members: Vec<RecordId> = self
            .xref_history
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .iter()
                    .find(|x| x.is_current())
                    .filter(|x| x.golden_id == golden_id)
                    .map(|_| entry.key().clone())
            })
            .collect();
        members.sort();
        Ok(members)
    }

    async fn xref_history_for(&self, source_record_id: &RecordId) -> MdmResult<Vec<Xref>> {
        let _guard = self.consistency_lock.read();
        Ok(self
            .xref_history
            .get(source_record_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn events(&self) -> MdmResult<Vec<MergeEvent>> {
        let _guard = self.consistency_lock.read();
        Ok(self.events.lock().clone())
    }

    async fn related_entities(
        &self,
        golden_id: Uuid,
        relation_type: &str,
        _at_time: DateTime<Utc>,
    ) -> MdmResult<Vec<Uuid>> {
        let _guard = self.consistency_lock.read();
        if relation_type != "xref" {
            return Ok(Vec::new());
        }
        Ok(if self.golden_records.contains_key(&golden_id) {
            vec![golden_id]
        } else {
            Vec::new()
        })
    }

    async fn field_history(&self, golden_id: Uuid) -> MdmResult<Vec<FieldHistoryEntry>> {
        let _guard = self.consistency_lock.read();
        Ok(self
            .field_history
            .get(&golden_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}
