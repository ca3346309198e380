//! Pipeline Orchestrator: wires ingestion, preprocessing, embedding
//! attachment, trust scoring, blocking, matching, clustering, survivorship,
//! and lineage commits into the two run modes the spec names — `rebuild`
//! (clear and reprocess everything) and `process_batch` (incremental,
//! seeded from existing cross-references). Generalizes the teacher's
//! `ConnectorRuntime` (one external call wrapped in retry/circuit-breaker/
//! metrics) into a multi-stage batch orchestrator; the per-stage timing and
//! counter conventions follow the same source.

pub mod embedding;
pub mod ingestion;
pub mod stats;

pub use embedding::{EmbeddingProvider, NoopEmbeddingProvider};
pub use ingestion::{DeadLetterRecord, DeadLetterSink, IngestionSource, InMemoryDeadLetterSink, VecIngestionSource};
pub use stats::PipelineStats;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mdm_blocking::{build_strategy, BlockingStrategy};
use mdm_clustering::{derive_transitions, ClusterBuilder, ClusterTransition};
use mdm_core::context::PipelineContext;
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::metrics_sink::MetricsSink;
use mdm_core::types::{
    AttributeValue, Cluster, FieldHistoryEntry, GoldenRecord, MatchDecision, MergeEvent,
    MergeEventType, NormalizedRecord, RecordId, Verdict, Xref,
};
use mdm_lineage::{commit_with_retry, LineageSink, RetryPolicy, StateSnapshot, Transaction};
use mdm_matching::MatchEngine;
use mdm_preprocess::Preprocessor;
use mdm_survivorship::{assign_merge_survivor, Survivor};
use mdm_trust::TrustScorer;

const PSEUDO_GOLDEN_PREFIX: &str = "golden:";

fn pseudo_golden_id(golden_id: Uuid) -> RecordId {
    format!("{PSEUDO_GOLDEN_PREFIX}{golden_id}")
}

fn parse_pseudo_golden_id(record_id: &str) -> Option<Uuid> {
    record_id
        .strip_prefix(PSEUDO_GOLDEN_PREFIX)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// A `GoldenRecord`'s already-survived attributes, presented as a
/// `NormalizedRecord` so `Survivor::build_golden_record` can fold it back in
/// alongside the current batch's live records without re-deriving trust for
/// source data that is no longer held in memory (the pipeline only ever
/// keeps the current batch's raw records, per §9's cyclic-reference note).
/// Carried at full trust: the value already survived a prior run's trust
/// scoring and field-level contest.
fn golden_as_pseudo_record(golden: &GoldenRecord) -> NormalizedRecord {
    use mdm_core::types::{Record, TrustScore};

    let record = Record {
        record_id: pseudo_golden_id(golden.golden_id),
        source_id: "golden_record".to_string(),
        attributes: golden.attributes.clone(),
        ingest_time: golden.updated_at,
        source_timestamp: golden.updated_at,
    };
    NormalizedRecord::new(record, golden.attributes.clone(), BTreeMap::new()).with_trust(TrustScore {
        source_reliability: 1.0,
        completeness: 1.0,
        timeliness: 1.0,
        validity: 1.0,
        overall: 1.0,
    })
}

/// Applies the same prior-current-row-closing rule `InMemoryLineageSink`
/// uses, so an `after_state` snapshot computed before commit matches what
/// the sink will actually store.
fn close_superseded(history: &mut [Xref], new_golden_id: Uuid, at: chrono::DateTime<Utc>) {
    for row in history.iter_mut() {
        if row.is_current() && row.golden_id != new_golden_id {
            row.valid_to = Some(at);
        }
    }
}

pub struct Orchestrator {
    context: PipelineContext,
    preprocessor: Preprocessor,
    trust_scorer: TrustScorer,
    blocking_strategy: Box<dyn BlockingStrategy>,
    match_engine: MatchEngine,
    survivor: Survivor,
    vector_fields: Vec<String>,
    retry_policy: RetryPolicy,
    ingestion: Arc<dyn IngestionSource>,
    embeddings: Arc<dyn EmbeddingProvider>,
    lineage: Arc<dyn LineageSink>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl Orchestrator {
    pub fn new(
        context: PipelineContext,
        ingestion: Arc<dyn IngestionSource>,
        embeddings: Arc<dyn EmbeddingProvider>,
        lineage: Arc<dyn LineageSink>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> MdmResult<Self> {
        let config = context.config.clone();
        let preprocessor = Preprocessor::new(config.fields.clone())?;
        let trust_scorer = TrustScorer::new(&config.sources, config.fields.clone(), config.trust.clone());
        let blocking_strategy = build_strategy(&config.blocking)?;
        let comparator_params: BTreeMap<String, serde_json::Value> = config
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.comparator_params.clone()))
            .collect();
        let match_engine = MatchEngine::new(
            &config.fields,
            &comparator_params,
            config.thresholds.clone(),
            config.concurrency.comparator_cache_capacity,
        )?;
        let source_precedence: Vec<String> = {
            let mut sources = config.sources.clone();
            sources.sort_by_key(|s| s.precedence);
            sources.into_iter().map(|s| s.source_id).collect()
        };
        let survivor = Survivor::new(config.survivorship.clone(), source_precedence);
        let vector_fields = config
            .fields
            .iter()
            .filter(|f| f.comparator == "vector")
            .map(|f| f.name.clone())
            .collect();
        let retry_policy = RetryPolicy::from(&config.lineage);

        Ok(Self {
            context,
            preprocessor,
            trust_scorer,
            blocking_strategy,
            match_engine,
            survivor,
            vector_fields,
            retry_policy,
            ingestion,
            embeddings,
            lineage,
            dead_letters,
        })
    }

    /// Incremental mode: ingests one batch, seeding cluster membership from
    /// existing cross-references so a record that rejoins a previously
    /// established golden record extends it instead of forming a new one.
    pub async fn process_batch(&self, cancel: &CancellationToken) -> MdmResult<PipelineStats> {
        let started = Instant::now();
        let records = self.ingestion.fetch_batch().await?;
        let mut stats = PipelineStats::new();
        stats.records_ingested = records.len() as u64;

        let normalized = self.normalize_and_score(records, &mut stats).await?;
        if cancel.is_cancelled() {
            return Err(MdmError::Pipeline("cancelled during preprocessing".to_string()));
        }

        let (pseudo_records, prior_clusters) = self.seed_from_existing_goldens().await?;
        let mut pool: Vec<NormalizedRecord> = normalized.clone();
        pool.extend(pseudo_records);

        let result = self.run_matching_and_clustering(&pool, &prior_clusters, cancel, &mut stats)?;

        self.persist_clusters(&normalized, &result.clusters, &prior_clusters, cancel, &mut stats)
            .await?;

        stats.duration = started.elapsed();
        MetricsSink::record_stage_duration("pipeline.process_batch", stats.duration);
        Ok(stats)
    }

    /// Full rebuild: every currently-recorded golden record is closed out
    /// with a SPLIT event, then the entire ingestion source is reprocessed
    /// from a clean union-find with no prior seeding. Reassigned
    /// cross-references self-correct via `LineageSink::commit`'s
    /// auto-close-on-reassignment rule, so no xref bookkeeping happens here.
    pub async fn rebuild(&self, cancel: &CancellationToken) -> MdmResult<PipelineStats> {
        let started = Instant::now();
        let mut stats = PipelineStats::new();

        let existing = self.lineage.all_goldens().await?;
        if !existing.is_empty() {
            let mut txn = Transaction::new();
            for golden in &existing {
                let before = StateSnapshot::new().with_golden(golden.golden_id, Some(golden.clone()));
                let after = StateSnapshot::new().with_golden(golden.golden_id, None);
                txn.delete_golden(golden.golden_id);
                txn.append_event(MergeEvent {
                    event_id: Uuid::new_v4(),
                    event_type: MergeEventType::Split,
                    timestamp: Utc::now(),
                    actor: "rebuild".to_string(),
                    affected_golden_ids: vec![golden.golden_id],
                    affected_record_ids: Vec::new(),
                    before_state: before.to_json(),
                    after_state: after.to_json(),
                });
            }
            self.lineage.commit(txn).await?;
            MetricsSink::incr_merge_events("split", existing.len() as u64);
        }

        let records = self.ingestion.fetch_batch().await?;
        stats.records_ingested = records.len() as u64;

        let normalized = self.normalize_and_score(records, &mut stats).await?;
        if cancel.is_cancelled() {
            return Err(MdmError::Pipeline("cancelled during preprocessing".to_string()));
        }

        let result = self.run_matching_and_clustering(&normalized, &[], cancel, &mut stats)?;
        self.persist_clusters(&normalized, &result.clusters, &[], cancel, &mut stats)
            .await?;

        stats.duration = started.elapsed();
        MetricsSink::record_stage_duration("pipeline.rebuild", stats.duration);
        Ok(stats)
    }

    async fn normalize_and_score(
        &self,
        records: Vec<mdm_core::types::Record>,
        stats: &mut PipelineStats,
    ) -> MdmResult<Vec<NormalizedRecord>> {
        let stage_started = Instant::now();
        let mut normalized: Vec<NormalizedRecord> = records
            .into_par_iter()
            .filter_map(|record| match self.preprocessor.normalize(record.clone()) {
                Ok(n) => Some(n),
                Err(err) => {
                    self.dead_letters.enqueue(DeadLetterRecord {
                        id: Uuid::new_v4(),
                        stage: "preprocess".to_string(),
                        record_id: record.record_id.clone(),
                        source_id: record.source_id.clone(),
                        reason: err.dead_letter_reason(),
                        error: err.to_string(),
                        failed_at: Utc::now(),
                    });
                    None
                }
            })
            .collect();

        stats.records_dead_lettered = stats.records_ingested - normalized.len() as u64;

        for record in normalized.iter_mut() {
            for field in &self.vector_fields {
                let Some(value) = record.normalized.get(field).cloned() else {
                    continue;
                };
                if let Some(vector) = self.embeddings.embed(field, &value).await? {
                    let sequence = vector.iter().map(|c| AttributeValue::Number(*c as f64)).collect();
                    record.normalized.insert(field.clone(), AttributeValue::Sequence(sequence));
                    record.embeddings.insert(field.clone(), vector);
                }
            }
        }

        let scored: Vec<NormalizedRecord> = normalized
            .into_par_iter()
            .map(|record| {
                let trust = self.trust_scorer.score(&record);
                record.with_trust(trust)
            })
            .collect();

        for record in &scored {
            MetricsSink::incr_records_processed(record.source_id(), 1);
        }
        MetricsSink::record_stage_duration("pipeline.normalize_and_score", stage_started.elapsed());
        Ok(scored)
    }

    /// Pulls every existing golden record into the batch as a full-trust
    /// pseudo-record and seeds the union-find with each golden's complete
    /// current member set. This is how incremental mode satisfies §4.9's
    /// "the Blocker co-ingests existing normalized records (or their block
    /// keys) so cross-batch matches are found": a brand-new incoming record
    /// that was never previously ingested can still be blocked against, and
    /// matched to, a pseudo-record standing in for an existing golden
    /// record, and the seed ensures unioning with that pseudo-record joins
    /// (or, if two pseudo-records end up unioned, merges) the real cluster
    /// the golden record already represents — without holding those other
    /// members' raw attributes in memory, per §9's cyclic-reference note.
    async fn seed_from_existing_goldens(&self) -> MdmResult<(Vec<NormalizedRecord>, Vec<Cluster>)> {
        let goldens = self.lineage.all_goldens().await?;
        let mut pseudo_records = Vec::with_capacity(goldens.len());
        let mut prior_clusters = Vec::with_capacity(goldens.len());
        for golden in &goldens {
            let root = pseudo_golden_id(golden.golden_id);
            let mut members = self.lineage.current_members(golden.golden_id).await?;
            members.push(root.clone());
            prior_clusters.push(Cluster { root, members });
            pseudo_records.push(golden_as_pseudo_record(golden));
        }
        Ok((pseudo_records, prior_clusters))
    }

    fn run_matching_and_clustering(
        &self,
        normalized: &[NormalizedRecord],
        prior_clusters: &[Cluster],
        cancel: &CancellationToken,
        stats: &mut PipelineStats,
    ) -> MdmResult<mdm_clustering::ClusteringResult> {
        let stage_started = Instant::now();
        let pairs = self.blocking_strategy.generate_pairs(normalized)?;
        stats.candidate_pairs = pairs.len() as u64;
        MetricsSink::incr_candidate_pairs(self.blocking_strategy.name(), pairs.len() as u64);

        if cancel.is_cancelled() {
            return Err(MdmError::Pipeline("cancelled before matching".to_string()));
        }

        let by_id: HashMap<&RecordId, &NormalizedRecord> =
            normalized.iter().map(|r| (r.record_id(), r)).collect();

        let decisions: Vec<MatchDecision> = pairs
            .into_par_iter()
            .filter_map(|pair| {
                let left = by_id.get(&pair.a)?;
                let right = by_id.get(&pair.b)?;
                Some(self.match_engine.evaluate(pair, left, right))
            })
            .collect();

        for decision in &decisions {
            match decision.verdict {
                Verdict::Match => stats.verdicts_match += 1,
                Verdict::Review => stats.verdicts_review += 1,
                Verdict::NoMatch => stats.verdicts_no_match += 1,
            }
        }
        MetricsSink::record_stage_duration("pipeline.match", stage_started.elapsed());

        if cancel.is_cancelled() {
            return Err(MdmError::Pipeline("cancelled before clustering".to_string()));
        }

        let mut builder = ClusterBuilder::new(self.context.config.thresholds.transitivity_guard_enabled);
        builder.seed(prior_clusters);
        for record in normalized {
            builder.observe(record.record_id());
        }
        let result = builder.build(&decisions);
        stats.demoted_edges = result.demoted.len() as u64;
        Ok(result)
    }

    async fn persist_clusters(
        &self,
        normalized: &[NormalizedRecord],
        clusters: &[Cluster],
        prior_clusters: &[Cluster],
        cancel: &CancellationToken,
        stats: &mut PipelineStats,
    ) -> MdmResult<()> {
        let stage_started = Instant::now();
        let by_id: HashMap<&RecordId, &NormalizedRecord> =
            normalized.iter().map(|r| (r.record_id(), r)).collect();
        let incoming_ids: BTreeSet<RecordId> = normalized.iter().map(|r| r.record_id().clone()).collect();
        let transitions = derive_transitions(prior_clusters, clusters);

        for cluster in clusters {
            if cancel.is_cancelled() {
                return Err(MdmError::Pipeline("cancelled during lineage commit".to_string()));
            }

            let real_members: Vec<&NormalizedRecord> = cluster
                .members
                .iter()
                .filter(|m| incoming_ids.contains(*m))
                .filter_map(|m| by_id.get(m).copied())
                .collect();
            if real_members.is_empty() {
                // Untouched existing golden record: no new data joined it.
                continue;
            }

            let referenced_goldens: BTreeSet<Uuid> =
                cluster.members.iter().filter_map(|m| parse_pseudo_golden_id(m)).collect();

            self.commit_cluster(cluster, &real_members, &referenced_goldens, transitions.get(&cluster.root).copied(), stats)
                .await?;
        }
        MetricsSink::record_stage_duration("pipeline.persist", stage_started.elapsed());
        Ok(())
    }

    async fn commit_cluster(
        &self,
        cluster: &Cluster,
        real_members: &[&NormalizedRecord],
        referenced_goldens: &BTreeSet<Uuid>,
        transition_hint: Option<ClusterTransition>,
        stats: &mut PipelineStats,
    ) -> MdmResult<()> {
        let mut existing_goldens = Vec::with_capacity(referenced_goldens.len());
        for golden_id in referenced_goldens {
            if let Some(golden) = self.lineage.get_golden(*golden_id).await? {
                existing_goldens.push(golden);
            }
        }

        let (event_type, existing_for_build, losers) = match existing_goldens.len() {
            0 => (MergeEventType::Create, None, Vec::new()),
            1 => (MergeEventType::Update, Some(existing_goldens[0].clone()), Vec::new()),
            _ => {
                let surviving = existing_goldens
                    .iter()
                    .cloned()
                    .reduce(|a, b| {
                        let winner = assign_merge_survivor(&a, &b);
                        if winner.surviving_id == a.golden_id { a } else { b }
                    })
                    .expect("existing_goldens is non-empty");
                let losers: Vec<Uuid> = existing_goldens
                    .iter()
                    .map(|g| g.golden_id)
                    .filter(|id| *id != surviving.golden_id)
                    .collect();
                (MergeEventType::Merge, Some(surviving), losers)
            }
        };

        let mut pseudo_records: Vec<NormalizedRecord> =
            existing_goldens.iter().map(golden_as_pseudo_record).collect();
        let mut members: Vec<NormalizedRecord> = real_members.iter().map(|r| (*r).clone()).collect();
        members.append(&mut pseudo_records);

        let golden = self
            .survivor
            .build_golden_record(cluster.root.clone(), &members, existing_for_build.as_ref())?;

        let now = Utc::now();
        let mut affected_golden_ids = vec![golden.golden_id];
        affected_golden_ids.extend(losers.iter().copied());

        let real_record_ids: Vec<RecordId> = real_members.iter().map(|r| r.record_id().clone()).collect();

        // Every record this batch scored directly gets a fresh xref below.
        // But a MERGE also carries forward cluster members that arrived in
        // an earlier batch and never appear in `real_members` here — their
        // last xref still points at whichever golden this merge just closed
        // out, and per §4.8's "union of current Xrefs equals the cluster's
        // member set" invariant (and S5's "closed xrefs on the loser updated
        // to point at survivor") they must be re-pointed at the survivor too.
        let mut carried_xrefs: Vec<Xref> = Vec::new();
        for member_id in &cluster.members {
            if parse_pseudo_golden_id(member_id).is_some() || real_record_ids.contains(member_id) {
                continue;
            }
            if let Some(current) = self.lineage.current_xref(member_id).await? {
                if current.golden_id != golden.golden_id {
                    carried_xrefs.push(current);
                }
            }
        }

        let mut before = StateSnapshot::new();
        before = before.with_golden(golden.golden_id, existing_for_build.clone());
        for loser_id in &losers {
            let loser = existing_goldens.iter().find(|g| g.golden_id == *loser_id).cloned();
            before = before.with_golden(*loser_id, loser);
        }

        let mut xref_histories: HashMap<RecordId, Vec<Xref>> = HashMap::new();
        for member in real_members {
            let history = self.lineage.xref_history_for(member.record_id()).await?;
            xref_histories.insert(member.record_id().clone(), history);
        }
        for carried in &carried_xrefs {
            let history = self.lineage.xref_history_for(&carried.source_record_id).await?;
            xref_histories.insert(carried.source_record_id.clone(), history);
        }
        for (record_id, history) in &xref_histories {
            before = before.with_xref_history(record_id.clone(), history.clone());
        }

        let golden_clone = golden.clone();
        let losers_clone = losers.clone();
        let xref_histories_clone = xref_histories.clone();
        let real_source_ids: Vec<String> = real_members.iter().map(|r| r.source_id().clone()).collect();
        let real_trusts: Vec<f64> = real_members
            .iter()
            .map(|r| r.trust.map(|t| t.overall).unwrap_or(1.0))
            .collect();
        let carried_source_systems: HashMap<RecordId, (String, f64)> = carried_xrefs
            .iter()
            .map(|x| (x.source_record_id.clone(), (x.source_system.clone(), x.confidence)))
            .collect();

        let after = {
            let mut snap = StateSnapshot::new().with_golden(golden_clone.golden_id, Some(golden_clone.clone()));
            for loser_id in &losers_clone {
                snap = snap.with_golden(*loser_id, None);
            }
            for (record_id, history) in &xref_histories_clone {
                let mut updated = history.clone();
                close_superseded(&mut updated, golden_clone.golden_id, now);
                let (source_system, confidence) = carried_source_systems
                    .get(record_id)
                    .cloned()
                    .unwrap_or_else(|| (String::new(), 1.0));
                updated.push(Xref {
                    source_record_id: record_id.clone(),
                    source_system,
                    golden_id: golden_clone.golden_id,
                    valid_from: now,
                    valid_to: None,
                    confidence,
                });
                snap = snap.with_xref_history(record_id.clone(), updated);
            }
            snap
        };

        let mut affected_record_ids = real_record_ids.clone();
        affected_record_ids.extend(carried_xrefs.iter().map(|x| x.source_record_id.clone()));

        let event = MergeEvent {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: now,
            actor: "pipeline".to_string(),
            affected_golden_ids,
            affected_record_ids,
            before_state: before.to_json(),
            after_state: after.to_json(),
        };

        let golden_for_commit = golden.clone();
        let losers_for_commit = losers.clone();
        let carried_for_commit = carried_xrefs.clone();
        let lineage = self.lineage.clone();
        commit_with_retry(lineage.as_ref(), self.retry_policy, move || {
            let mut txn = Transaction::new();
            txn.upsert_golden(golden_for_commit.clone());
            for loser in &losers_for_commit {
                txn.delete_golden(*loser);
            }
            for ((record_id, source_id), trust) in real_record_ids.iter().zip(real_source_ids.iter()).zip(real_trusts.iter()) {
                txn.upsert_xref(Xref {
                    source_record_id: record_id.clone(),
                    source_system: source_id.clone(),
                    golden_id: golden_for_commit.golden_id,
                    valid_from: now,
                    valid_to: None,
                    confidence: *trust,
                });
            }
            for carried in &carried_for_commit {
                txn.upsert_xref(Xref {
                    source_record_id: carried.source_record_id.clone(),
                    source_system: carried.source_system.clone(),
                    golden_id: golden_for_commit.golden_id,
                    valid_from: now,
                    valid_to: None,
                    confidence: carried.confidence,
                });
            }
            for (field, value) in &golden_for_commit.attributes {
                let provenance = golden_for_commit.provenance.get(field);
                txn.append_field_history(FieldHistoryEntry {
                    golden_id: golden_for_commit.golden_id,
                    field: field.clone(),
                    value: value.clone(),
                    source_record_id: provenance.map(|p| p.record_id.clone()).unwrap_or_default(),
                    source_system: provenance.map(|p| p.source_id.clone()).unwrap_or_default(),
                    observed_at: now,
                });
            }
            txn.append_event(event.clone());
            txn
        })
        .await?;

        stats.golden_records_written += 1;
        stats.merge_events_written += 1;
        match transition_hint.unwrap_or(match event_type {
            MergeEventType::Create => ClusterTransition::Create,
            MergeEventType::Merge => ClusterTransition::Merge,
            _ => ClusterTransition::Update,
        }) {
            ClusterTransition::Create => stats.clusters_created += 1,
            ClusterTransition::Update => stats.clusters_updated += 1,
            ClusterTransition::Merge => stats.clusters_merged += 1,
        }
        MetricsSink::incr_merge_events(event_type_label(event_type), 1);
        Ok(())
    }
}

fn event_type_label(event_type: MergeEventType) -> &'static str {
    match event_type {
        MergeEventType::Create => "create",
        MergeEventType::Update => "update",
        MergeEventType::Merge => "merge",
        MergeEventType::Split => "split",
        MergeEventType::Link => "link",
        MergeEventType::Unlink => "unlink",
    }
}
