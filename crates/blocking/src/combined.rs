use std::collections::BTreeSet;

use mdm_core::error::MdmResult;
use mdm_core::types::{CandidatePair, NormalizedRecord};

use crate::BlockingStrategy;

/// Unions the candidate pairs of several strategies run independently,
/// letting a configuration select e.g. standard blocking on an exact key
/// plus sorted-neighborhood on a fuzzy one without one strategy's blind
/// spots dropping true matches the other would have caught.
pub struct CombinedBlocker {
    strategies: Vec<Box<dyn BlockingStrategy>>,
}

impl CombinedBlocker {
    pub fn new(strategies: Vec<Box<dyn BlockingStrategy>>) -> Self {
        Self { strategies }
    }
}

impl BlockingStrategy for CombinedBlocker {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn generate_pairs(&self, records: &[NormalizedRecord]) -> MdmResult<BTreeSet<CandidatePair>> {
        let mut pairs = BTreeSet::new();
        for strategy in &self.strategies {
            pairs.extend(strategy.generate_pairs(records)?);
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SortedNeighborhoodBlocker, StandardBlocker};
    use chrono::Utc;
    use mdm_core::types::{AttributeValue, Attributes, Record};
    use std::collections::BTreeMap;

    fn normalized(id: &str, city: &str, zip: &str) -> NormalizedRecord {
        let mut attrs: Attributes = BTreeMap::new();
        attrs.insert("city".to_string(), AttributeValue::String(city.to_string()));
        attrs.insert("zip".to_string(), AttributeValue::String(zip.to_string()));
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
    fn unions_pairs_found_by_either_sub_strategy() {
        let records = vec![
            normalized("a", "springfield", "00001"),
            normalized("b", "shelbyville", "00002"),
            normalized("c", "springfield", "00009"),
        ];
        // "a" and "c" share a city (standard catches it); "a" and "b" are
        // adjacent by zip under a window of 2 (sorted-neighborhood catches
        // it); neither strategy alone would produce both pairs.
        let combined = CombinedBlocker::new(vec![
            Box::new(StandardBlocker::new(vec!["city".to_string()], 1_000)),
            Box::new(SortedNeighborhoodBlocker::new(vec!["zip".to_string()], 2)),
        ]);
        let pairs = combined.generate_pairs(&records).unwrap();
        assert!(pairs.contains(&CandidatePair::new("a".to_string(), "c".to_string())));
        assert!(pairs.contains(&CandidatePair::new("a".to_string(), "b".to_string())));
    }

    #[test]
    fn empty_strategy_list_produces_no_pairs() {
        let combined = CombinedBlocker::new(Vec::new());
        let records = vec![normalized("a", "springfield", "00001")];
        assert!(combined.generate_pairs(&records).unwrap().is_empty());
    }
}
