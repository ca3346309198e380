use std::collections::BTreeSet;

use mdm_core::error::MdmResult;
use mdm_core::types::{CandidatePair, NormalizedRecord};

use crate::BlockingStrategy;

/// Sorts records by a composite key built from the configured fields, then
/// generates pairs within a sliding window of size `window_size`.
pub struct SortedNeighborhoodBlocker {
    keys: Vec<String>,
    window_size: usize,
}

impl SortedNeighborhoodBlocker {
    pub fn new(keys: Vec<String>, window_size: usize) -> Self {
        Self { keys, window_size }
    }

    fn composite_key(&self, record: &NormalizedRecord) -> String {
        self.keys
            .iter()
            .map(|field| {
                record
                    .normalized
                    .get(field)
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join("\u{1}")
    }
}

impl BlockingStrategy for SortedNeighborhoodBlocker {
    fn name(&self) -> &'static str {
        "sorted_neighborhood"
    }

    fn generate_pairs(&self, records: &[NormalizedRecord]) -> MdmResult<BTreeSet<CandidatePair>> {
        let mut indexed: Vec<(String, usize)> = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (self.composite_key(r), idx))
            .collect();
        // stable sort: ties keep original record order, preserving determinism
        indexed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pairs = BTreeSet::new();
        for i in 0..indexed.len() {
            let hi = (i + self.window_size + 1).min(indexed.len());
            for j in (i + 1)..hi {
                let (_, idx_a) = indexed[i];
                let (_, idx_b) = indexed[j];
                pairs.insert(CandidatePair::new(
                    records[idx_a].record_id().clone(),
                    records[idx_b].record_id().clone(),
                ));
            }
        }
        Ok(pairs)
    }
}
