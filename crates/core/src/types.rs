//! The core data model: records, normalized records, candidate pairs, match
//! decisions, clusters, trust scores, golden records, cross-references, and
//! merge events.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identifier for a source record.
pub type RecordId = String;

/// Identifier for a source system (e.g. "crm", "erp_sap", "legacy_mainframe").
pub type SourceId = String;

/// Ordered attribute map. `BTreeMap` (rather than a hash map) so that
/// serialized attribute sets and derived block keys are stable across runs,
/// which the determinism property (spec §8.1) depends on.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A typed field value. Mirrors the set of JSON-ish types the spec's data
/// model enumerates in §3: string, number, boolean, date, timestamp, nested
/// mapping, ordered sequence, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Sequence(Vec<AttributeValue>),
    Mapping(Attributes),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Best-effort coercion to a string, used by comparators and preprocessors
    /// that operate on textual representations.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Number(n) => Some(format_number(*n)),
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            AttributeValue::Timestamp(t) => Some(t.to_rfc3339()),
            AttributeValue::Sequence(_) | AttributeValue::Mapping(_) => None,
        }
    }

    /// Best-effort coercion to a number, used by the numeric comparator.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// An immutable source record as it arrived from the ingestion iterator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: RecordId,
    pub source_id: SourceId,
    pub attributes: Attributes,
    pub ingest_time: DateTime<Utc>,
    pub source_timestamp: DateTime<Utc>,
}

/// A `Record` plus normalized attribute values and optional embeddings,
/// derived once by the preprocessor and never mutated afterward. Trust is
/// attached by a later, still-immutable construction step (see
/// [`NormalizedRecord::with_trust`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub record: Record,
    pub normalized: Attributes,
    pub embeddings: BTreeMap<String, Vec<f32>>,
    pub trust: Option<TrustScore>,
}

impl NormalizedRecord {
    pub fn new(record: Record, normalized: Attributes, embeddings: BTreeMap<String, Vec<f32>>) -> Self {
        Self {
            record,
            normalized,
            embeddings,
            trust: None,
        }
    }

    /// Consumes `self` and returns a new, immutable `NormalizedRecord` with
    /// the trust score attached. This is not in-place mutation: the trust
    /// scorer produces a distinct value, matching the "derived, never
    /// mutated" invariant on the underlying record and normalized fields.
    pub fn with_trust(mut self, trust: TrustScore) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record.record_id
    }

    pub fn source_id(&self) -> &SourceId {
        &self.record.source_id
    }
}

/// A blocking key a record was assigned to by the Blocker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockKey(pub String);

impl BlockKey {
    pub fn new(strategy: &str, key: impl Into<String>) -> Self {
        Self(format!("{strategy}:{}", key.into()))
    }
}

/// An unordered candidate pair, always stored with `a < b` lexicographically
/// so that a pair generated by two different blocks collapses to one value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    pub a: RecordId,
    pub b: RecordId,
}

impl CandidatePair {
    pub fn new(x: RecordId, y: RecordId) -> Self {
        match x.cmp(&y) {
            Ordering::Less => CandidatePair { a: x, b: y },
            Ordering::Equal => CandidatePair { a: x, b: y },
            Ordering::Greater => CandidatePair { a: y, b: x },
        }
    }
}

/// Outcome of the Match Engine's verdict policy (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    Review,
    NoMatch,
}

/// The result of comparing one candidate pair across all configured fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub pair: CandidatePair,
    pub overall_score: f64,
    pub per_field_scores: BTreeMap<String, f64>,
    pub verdict: Verdict,
    pub rule_id: String,
}

/// A maximal set of records connected by MATCH decisions. `root` is the
/// union-find representative chosen by the Cluster Builder; it is a stable
/// handle for the cluster across incremental batches, distinct from the
/// `golden_id` that the Survivor assigns to its golden record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub root: RecordId,
    pub members: Vec<RecordId>,
}

/// Per-record trust score, composed of four [0,1] components (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    pub source_reliability: f64,
    pub completeness: f64,
    pub timeliness: f64,
    pub validity: f64,
    pub overall: f64,
}

/// Which survivorship rule selected an attribute's surviving value, and
/// where that value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeProvenance {
    pub record_id: RecordId,
    pub source_id: SourceId,
    pub rule: String,
}

/// The merged, "golden" representative of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenRecord {
    pub golden_id: Uuid,
    pub attributes: Attributes,
    pub provenance: BTreeMap<String, AttributeProvenance>,
    pub cluster_id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// A directed, interval-valid mapping from a source record to a golden id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Xref {
    pub source_record_id: RecordId,
    pub source_system: SourceId,
    pub golden_id: Uuid,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub confidence: f64,
}

impl Xref {
    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }

    pub fn is_current_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.map(|to| at < to).unwrap_or(true)
    }
}

/// The kind of state transition a [`MergeEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeEventType {
    Create,
    Update,
    Merge,
    Split,
    Link,
    Unlink,
}

/// An append-only, reversible record of a state transition in the lineage
/// store. `before_state`/`after_state` carry enough of the affected golden
/// records (and xrefs) to replay the transition in reverse during rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeEvent {
    pub event_id: Uuid,
    pub event_type: MergeEventType,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub affected_golden_ids: Vec<Uuid>,
    pub affected_record_ids: Vec<RecordId>,
    pub before_state: serde_json::Value,
    pub after_state: serde_json::Value,
}

/// A single row of the `field_history` logical table: the value a given
/// field had as observed from one source record at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHistoryEntry {
    pub golden_id: Uuid,
    pub field: String,
    pub value: AttributeValue,
    pub source_record_id: RecordId,
    pub source_system: SourceId,
    pub observed_at: DateTime<Utc>,
}
