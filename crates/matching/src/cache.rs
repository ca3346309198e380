//! Comparator memoization cache keyed by `(comparator_id, normalized_left,
//! normalized_right)`. `moka::sync::Cache` gives us a sharded, concurrent,
//! bounded-capacity map with LRU-ish eviction — the same tool
//! `mattepiu-drift`'s analysis engine reaches for to cache symbol lookups.
//!
//! The cache only ever stores hashable string keys: `AttributeValue` itself
//! is not `Hash` (it carries `f64`), so normalized values are pre-hashed to
//! their textual representation before becoming part of the key, per the
//! "pre-hashing is mandatory" contract.

use moka::sync::Cache;

use mdm_core::error::MdmResult;
use mdm_core::types::AttributeValue;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    comparator_id: String,
    left: String,
    right: String,
}

fn key_repr(value: &AttributeValue) -> String {
    value
        .as_text()
        .unwrap_or_else(|| format!("{value:?}"))
}

pub struct ComparatorCache {
    inner: Cache<CacheKey, f64>,
}

impl ComparatorCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    /// Returns the cached score for `(comparator_id, left, right)`, computing
    /// and inserting it via `compute` on a miss. Comparator failures are
    /// propagated to the caller and never cached, since a transient failure
    /// should not poison future lookups for the same pair.
    pub fn get_or_compute(
        &self,
        comparator_id: &str,
        left: &AttributeValue,
        right: &AttributeValue,
        compute: impl FnOnce() -> MdmResult<f64>,
    ) -> MdmResult<f64> {
        let key = CacheKey {
            comparator_id: comparator_id.to_string(),
            left: key_repr(left),
            right: key_repr(right),
        };
        if let Some(score) = self.inner.get(&key) {
            return Ok(score);
        }
        let score = compute()?;
        self.inner.insert(key, score);
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn second_lookup_hits_cache() {
        let cache = ComparatorCache::new(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let a = AttributeValue::String("x".to_string());
        let b = AttributeValue::String("y".to_string());

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            cache
                .get_or_compute("exact", &a, &b, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1.0)
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_comparator_ids_do_not_collide() {
        let cache = ComparatorCache::new(100);
        let a = AttributeValue::String("x".to_string());
        let b = AttributeValue::String("y".to_string());
        let first = cache.get_or_compute("exact", &a, &b, || Ok(1.0)).unwrap();
        let second = cache.get_or_compute("fuzzy:jaro", &a, &b, || Ok(0.3)).unwrap();
        assert_eq!(first, 1.0);
        assert_eq!(second, 0.3);
    }
}
