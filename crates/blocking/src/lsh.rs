use std::collections::BTreeSet;

use dashmap::DashMap;

use mdm_core::error::MdmResult;
use mdm_core::types::{BlockKey, CandidatePair, NormalizedRecord};

use crate::BlockingStrategy;

/// Locality-sensitive hashing over pre-computed embeddings. Buckets by a
/// deterministic hash of each vector's quantized components rather than a
/// randomized projection, so that candidate generation reproduces exactly
/// for a fixed configuration (see the determinism discussion in the design
/// ledger). A real ANN index (HNSW/IVF-Flat) can be swapped in at the
/// `BlockingStrategy` seam without touching callers; re-validate
/// determinism expectations if doing so.
pub struct LshBlocker {
    fields: Vec<String>,
    top_k: usize,
}

impl LshBlocker {
    pub fn new(fields: Vec<String>, top_k: usize) -> Self {
        Self { fields, top_k }
    }

    /// Quantizes each component to a fixed number of buckets and joins them
    /// into one hash key, giving near-duplicate vectors matching keys.
    fn bucket_key(vector: &[f32]) -> String {
        const QUANTUM: f32 = 0.25;
        vector
            .iter()
            .map(|c| (c / QUANTUM).round() as i64)
            .map(|q| q.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl BlockingStrategy for LshBlocker {
    fn name(&self) -> &'static str {
        "lsh"
    }

    fn generate_pairs(&self, records: &[NormalizedRecord]) -> MdmResult<BTreeSet<CandidatePair>> {
        let mut pairs = BTreeSet::new();

        for field in &self.fields {
            let buckets: DashMap<BlockKey, Vec<usize>> = DashMap::new();
            for (idx, record) in records.iter().enumerate() {
                if let Some(vector) = record.embeddings.get(field) {
                    let key = BlockKey::new("lsh", format!("{field}:{}", Self::bucket_key(vector)));
                    buckets.entry(key).or_default().push(idx);
                }
            }
            for entry in buckets.iter() {
                let bucket = entry.value();
                for i in 0..bucket.len() {
                    let neighbors = &bucket[(i + 1)..bucket.len().min(i + 1 + self.top_k)];
                    for &j in neighbors {
                        pairs.insert(CandidatePair::new(
                            records[bucket[i]].record_id().clone(),
                            records[j].record_id().clone(),
                        ));
                    }
                }
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdm_core::types::{Attributes, Record};
    use std::collections::BTreeMap;

    fn normalized_with_embedding(id: &str, vector: Vec<f32>) -> NormalizedRecord {
        let attrs: Attributes = BTreeMap::new();
        let record = Record {
            record_id: id.to_string(),
            source_id: "crm".to_string(),
            attributes: attrs.clone(),
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        };
        let mut embeddings = BTreeMap::new();
        embeddings.insert("bio".to_string(), vector);
        NormalizedRecord::new(record, attrs, embeddings)
    }

    #[test]
    fn near_identical_vectors_bucket_together() {
        let blocker = LshBlocker::new(vec!["bio".to_string()], 5);
        let records = vec![
            normalized_with_embedding("a", vec![1.0, 0.0]),
            normalized_with_embedding("b", vec![1.02, 0.01]),
        ];
        let pairs = blocker.generate_pairs(&records).unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn distant_vectors_do_not_bucket_together() {
        let blocker = LshBlocker::new(vec!["bio".to_string()], 5);
        let records = vec![
            normalized_with_embedding("a", vec![1.0, 0.0]),
            normalized_with_embedding("b", vec![-1.0, 0.0]),
        ];
        let pairs = blocker.generate_pairs(&records).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn records_without_embeddings_are_skipped() {
        let blocker = LshBlocker::new(vec!["bio".to_string()], 5);
        let attrs: Attributes = BTreeMap::new();
        let record = Record {
            record_id: "c".to_string(),
            source_id: "crm".to_string(),
            attributes: attrs.clone(),
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        };
        let records = vec![NormalizedRecord::new(record, attrs, BTreeMap::new())];
        assert!(blocker.generate_pairs(&records).unwrap().is_empty());
    }
}
