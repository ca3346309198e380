use std::collections::BTreeSet;

use dashmap::DashMap;
use rayon::prelude::*;

use mdm_core::error::MdmResult;
use mdm_core::types::{BlockKey, CandidatePair, NormalizedRecord};

use crate::{check_block_explosion, BlockingStrategy};

/// One key per configured blocking field, formed by concatenating a
/// strategy prefix with the field's normalized value. Two records are
/// candidates if they share any key. Mirrors
/// `crates/cdp/src/identity.rs::index_key` generalized to multiple
/// concurrently-maintained indices, one per blocking field.
pub struct StandardBlocker {
    keys: Vec<String>,
    max_block_size: usize,
}

impl StandardBlocker {
    pub fn new(keys: Vec<String>, max_block_size: usize) -> Self {
        Self { keys, max_block_size }
    }
}

impl BlockingStrategy for StandardBlocker {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn generate_pairs(&self, records: &[NormalizedRecord]) -> MdmResult<BTreeSet<CandidatePair>> {
        let index: DashMap<BlockKey, Vec<usize>> = DashMap::new();

        for (idx, record) in records.iter().enumerate() {
            for field in &self.keys {
                if let Some(value) = record.normalized.get(field).and_then(|v| v.as_text()) {
                    let key = BlockKey::new("standard", format!("{field}:{value}"));
                    index.entry(key).or_default().push(idx);
                }
            }
        }

        let mut max_bucket = 0usize;
        for entry in index.iter() {
            max_bucket = max_bucket.max(entry.value().len());
        }
        check_block_explosion(max_bucket, self.max_block_size)?;

        let pairs: BTreeSet<CandidatePair> = index
            .par_iter()
            .flat_map(|entry| {
                let bucket = entry.value();
                let mut local = Vec::new();
                for i in 0..bucket.len() {
                    for j in (i + 1)..bucket.len() {
                        local.push(CandidatePair::new(
                            records[bucket[i]].record_id().clone(),
                            records[bucket[j]].record_id().clone(),
                        ));
                    }
                }
                local
            })
            .collect();

        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdm_core::types::{AttributeValue, Attributes, Record};
    use std::collections::BTreeMap;

    fn normalized(id: &str, city: &str) -> NormalizedRecord {
        let mut attrs: Attributes = BTreeMap::new();
        attrs.insert("city".to_string(), AttributeValue::String(city.to_string()));
        let record = Record {
            record_id: id.to_string(),
            source_id: "crm".to_string(),
            attributes: attrs.clone(),
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        };
        NormalizedRecord::new(record, attrs, BTreeMap::new())
    }

    #[test]
    fn shares_key_produces_pair() {
        let blocker = StandardBlocker::new(vec!["city".to_string()], 1_000);
        let records = vec![normalized("a", "springfield"), normalized("b", "springfield")];
        let pairs = blocker.generate_pairs(&records).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs.contains(&CandidatePair::new("a".to_string(), "b".to_string())));
    }

    #[test]
    fn distinct_keys_produce_no_pair() {
        let blocker = StandardBlocker::new(vec!["city".to_string()], 1_000);
        let records = vec![normalized("a", "springfield"), normalized("b", "shelbyville")];
        let pairs = blocker.generate_pairs(&records).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn explosion_guard_trips_on_oversized_bucket() {
        let blocker = StandardBlocker::new(vec!["city".to_string()], 2);
        let records: Vec<_> = (0..5)
            .map(|i| normalized(&format!("r{i}"), "springfield"))
            .collect();
        assert!(blocker.generate_pairs(&records).is_err());
    }
}
