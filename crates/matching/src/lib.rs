//! Match engine: runs the configured comparators over a candidate pair,
//! aggregates per-field scores, and issues a verdict. Generalizes the
//! teacher's `IdentityGraph::compute_similarity` (a single Jaccard-like
//! score over identity fields) into a configurable, cached, multi-field
//! scoring pipeline.

mod cache;
mod conditional;

pub use cache::ComparatorCache;
pub use conditional::ConditionalRule;

use std::collections::BTreeMap;

use mdm_comparators::{create_comparator, Comparator};
use mdm_core::config::{FieldConfig, NullPolicy, ThresholdConfig};
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::metrics_sink::MetricsSink;
use mdm_core::types::{CandidatePair, MatchDecision, NormalizedRecord, Verdict};

struct FieldMatcher {
    config: FieldConfig,
    comparator: Box<dyn Comparator>,
    condition: ConditionalRule,
}

pub struct MatchEngine {
    fields: Vec<FieldMatcher>,
    thresholds: ThresholdConfig,
    cache: ComparatorCache,
}

impl MatchEngine {
    pub fn new(
        fields: &[FieldConfig],
        comparator_params: &BTreeMap<String, serde_json::Value>,
        thresholds: ThresholdConfig,
        cache_capacity: u64,
    ) -> MdmResult<Self> {
        Self::with_conditions(fields, comparator_params, &BTreeMap::new(), thresholds, cache_capacity)
    }

    /// Same as [`MatchEngine::new`], additionally gating individual fields'
    /// comparators behind a [`ConditionalRule`] keyed by field name. A field
    /// with no entry in `conditions` always applies (`ConditionalRule::Always`).
    pub fn with_conditions(
        fields: &[FieldConfig],
        comparator_params: &BTreeMap<String, serde_json::Value>,
        conditions: &BTreeMap<String, ConditionalRule>,
        thresholds: ThresholdConfig,
        cache_capacity: u64,
    ) -> MdmResult<Self> {
        if !(thresholds.review_threshold <= thresholds.match_threshold) {
            return Err(MdmError::Config(
                "thresholds.review_threshold must be <= thresholds.match_threshold".to_string(),
            ));
        }
        let mut matchers = Vec::with_capacity(fields.len());
        for field in fields {
            let params = comparator_params
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            let comparator = create_comparator(&field.comparator, &params)?;
            let condition = conditions.get(&field.name).cloned().unwrap_or(ConditionalRule::Always);
            matchers.push(FieldMatcher {
                config: field.clone(),
                comparator,
                condition,
            });
        }
        Ok(Self {
            fields: matchers,
            thresholds,
            cache: ComparatorCache::new(cache_capacity),
        })
    }

    pub fn evaluate(
        &self,
        pair: CandidatePair,
        left: &NormalizedRecord,
        right: &NormalizedRecord,
    ) -> MatchDecision {
        let mut per_field_scores = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut min_score = f64::MAX;
        let mut product = 1.0;
        let mut contributed = false;

        for matcher in &self.fields {
            if !matcher.condition.matches(left, right) {
                continue;
            }

            let field = &matcher.config.name;
            let left_value = left.normalized.get(field);
            let right_value = right.normalized.get(field);

            let both_null = matches!(
                (left_value.map(|v| v.is_null()), right_value.map(|v| v.is_null())),
                (Some(true), Some(true)) | (None, None)
            );
            let either_null = left_value.map(|v| v.is_null()).unwrap_or(true)
                || right_value.map(|v| v.is_null()).unwrap_or(true);

            let score = if either_null {
                match matcher.config.null_policy {
                    NullPolicy::Skip => None,
                    NullPolicy::TreatAsMismatch => Some(0.0),
                    NullPolicy::TreatNullsEqual => {
                        if both_null {
                            Some(1.0)
                        } else {
                            Some(0.0)
                        }
                    }
                }
            } else {
                let (lv, rv) = (left_value.unwrap(), right_value.unwrap());
                let cached = self.cache.get_or_compute(
                    matcher.comparator.id(),
                    lv,
                    rv,
                    || matcher.comparator.compare(lv, rv),
                );
                match cached {
                    Ok(score) => Some(score),
                    Err(err) => {
                        tracing::warn!(
                            field = %field,
                            comparator = matcher.comparator.id(),
                            error = %err,
                            "comparator failed; scoring field as 0"
                        );
                        Some(0.0)
                    }
                }
            };

            if let Some(score) = score {
                per_field_scores.insert(field.clone(), score);
                weighted_sum += score * matcher.config.weight;
                weight_total += matcher.config.weight;
                min_score = min_score.min(score);
                product *= score;
                contributed = true;
            }
        }

        let overall_score = if !contributed {
            0.0
        } else {
            match self.thresholds.aggregation.as_str() {
                "min" => min_score,
                "product" => product,
                _ => {
                    if weight_total > 0.0 {
                        weighted_sum / weight_total
                    } else {
                        0.0
                    }
                }
            }
        };

        let verdict = if overall_score >= self.thresholds.match_threshold {
            Verdict::Match
        } else if overall_score >= self.thresholds.review_threshold {
            Verdict::Review
        } else {
            Verdict::NoMatch
        };

        MetricsSink::incr_match_verdict(verdict_label(verdict), 1);

        MatchDecision {
            pair,
            overall_score,
            per_field_scores,
            verdict,
            rule_id: self.thresholds.aggregation.clone(),
        }
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Match => "match",
        Verdict::Review => "review",
        Verdict::NoMatch => "no_match",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdm_core::types::{AttributeValue, Attributes, Record};
    use std::collections::BTreeMap;

    fn normalized(id: &str, name: &str) -> NormalizedRecord {
        let mut attrs: Attributes = BTreeMap::new();
        attrs.insert("name".to_string(), AttributeValue::String(name.to_string()));
        let record = Record {
            record_id: id.to_string(),
            source_id: "crm".to_string(),
            attributes: attrs.clone(),
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        };
        NormalizedRecord::new(record, attrs, BTreeMap::new())
    }

    fn field(name: &str, comparator: &str) -> FieldConfig {
        FieldConfig {
            name: name.to_string(),
            transforms: Vec::new(),
            comparator: comparator.to_string(),
            weight: 1.0,
            required_for_match: false,
            null_policy: NullPolicy::Skip,
            validation_regex: None,
            comparator_params: serde_json::json!({}),
        }
    }

    #[test]
    fn exact_match_yields_match_verdict() {
        let fields = vec![field("name", "exact")];
        let engine = MatchEngine::new(
            &fields,
            &BTreeMap::new(),
            ThresholdConfig {
                match_threshold: 0.9,
                review_threshold: 0.5,
                aggregation: "weighted_average".to_string(),
                transitivity_guard_enabled: true,
            },
            1000,
        )
        .unwrap();
        let a = normalized("a", "Acme");
        let b = normalized("b", "Acme");
        let decision = engine.evaluate(CandidatePair::new("a".to_string(), "b".to_string()), &a, &b);
        assert_eq!(decision.verdict, Verdict::Match);
        assert_eq!(decision.overall_score, 1.0);
    }

    #[test]
    fn mismatched_fields_yield_no_match() {
        let fields = vec![field("name", "exact")];
        let engine = MatchEngine::new(
            &fields,
            &BTreeMap::new(),
            ThresholdConfig {
                match_threshold: 0.9,
                review_threshold: 0.5,
                aggregation: "weighted_average".to_string(),
                transitivity_guard_enabled: true,
            },
            1000,
        )
        .unwrap();
        let a = normalized("a", "Acme");
        let b = normalized("b", "Globex");
        let decision = engine.evaluate(CandidatePair::new("a".to_string(), "b".to_string()), &a, &b);
        assert_eq!(decision.verdict, Verdict::NoMatch);
    }

    #[test]
    fn conditional_rule_skips_a_field_for_non_matching_pairs() {
        let fields = vec![field("name", "exact")];
        let mut conditions = BTreeMap::new();
        conditions.insert(
            "name".to_string(),
            ConditionalRule::FieldEquals {
                field: "name".to_string(),
                value: "never".to_string(),
            },
        );
        let engine = MatchEngine::with_conditions(
            &fields,
            &BTreeMap::new(),
            &conditions,
            ThresholdConfig {
                match_threshold: 0.9,
                review_threshold: 0.5,
                aggregation: "weighted_average".to_string(),
                transitivity_guard_enabled: true,
            },
            1000,
        )
        .unwrap();
        let a = normalized("a", "Acme");
        let b = normalized("b", "Acme");
        let decision = engine.evaluate(CandidatePair::new("a".to_string(), "b".to_string()), &a, &b);
        // The condition never matches "Acme", so the only configured field
        // never contributes and the pair falls out as NO_MATCH.
        assert_eq!(decision.verdict, Verdict::NoMatch);
        assert!(decision.per_field_scores.is_empty());
    }

    #[test]
    fn invalid_threshold_ordering_is_rejected() {
        let fields = vec![field("name", "exact")];
        let result = MatchEngine::new(
            &fields,
            &BTreeMap::new(),
            ThresholdConfig {
                match_threshold: 0.5,
                review_threshold: 0.9,
                aggregation: "weighted_average".to_string(),
                transitivity_guard_enabled: true,
            },
            1000,
        );
        assert!(result.is_err());
    }

    /// Property 8 (§8): for the `skip` null policy, a field with a null
    /// value on either side is excluded from both numerator and
    /// denominator, so it never perturbs the weighted average contributed
    /// by the other fields — regardless of the weights chosen.
    mod null_policy_property {
        use super::*;
        use proptest::prelude::*;

        fn record_with(id: &str, name_val: Option<&str>, other_val: &str) -> NormalizedRecord {
            let mut attrs: Attributes = BTreeMap::new();
            attrs.insert(
                "other".to_string(),
                AttributeValue::String(other_val.to_string()),
            );
            if let Some(v) = name_val {
                attrs.insert("name".to_string(), AttributeValue::String(v.to_string()));
            } else {
                attrs.insert("name".to_string(), AttributeValue::Null);
            }
            let record = Record {
                record_id: id.to_string(),
                source_id: "crm".to_string(),
                attributes: attrs.clone(),
                ingest_time: Utc::now(),
                source_timestamp: Utc::now(),
            };
            NormalizedRecord::new(record, attrs, BTreeMap::new())
        }

        proptest! {
            #[test]
            fn skipped_null_field_leaves_the_other_fields_average_unchanged(
                weight_name in 0.1f64..5.0,
                weight_other in 0.1f64..5.0,
                other_matches in any::<bool>(),
            ) {
                let fields = vec![
                    FieldConfig {
                        name: "name".to_string(),
                        transforms: Vec::new(),
                        comparator: "exact".to_string(),
                        weight: weight_name,
                        required_for_match: false,
                        null_policy: NullPolicy::Skip,
                        validation_regex: None,
                        comparator_params: serde_json::json!({}),
                    },
                    FieldConfig {
                        name: "other".to_string(),
                        transforms: Vec::new(),
                        comparator: "exact".to_string(),
                        weight: weight_other,
                        required_for_match: false,
                        null_policy: NullPolicy::Skip,
                        validation_regex: None,
                        comparator_params: serde_json::json!({}),
                    },
                ];
                let engine = MatchEngine::new(
                    &fields,
                    &BTreeMap::new(),
                    ThresholdConfig {
                        match_threshold: 0.9,
                        review_threshold: 0.5,
                        aggregation: "weighted_average".to_string(),
                        transitivity_guard_enabled: true,
                    },
                    1000,
                )
                .unwrap();

                let right_other = if other_matches { "same" } else { "different" };
                let left = record_with("a", None, "same");
                let right = record_with("b", None, right_other);

                let decision = engine.evaluate(
                    CandidatePair::new("a".to_string(), "b".to_string()),
                    &left,
                    &right,
                );

                // "name" is null on both sides and Skip-policy, so it must
                // not appear in per_field_scores and the overall score must
                // equal "other"'s contribution alone.
                prop_assert!(!decision.per_field_scores.contains_key("name"));
                let expected = if other_matches { 1.0 } else { 0.0 };
                prop_assert!((decision.overall_score - expected).abs() < 1e-9);
            }
        }
    }
}
