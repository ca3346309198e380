//! Conditional rule: a predicate over the two records being compared that
//! selects which comparator configuration applies. Kept as a small
//! standalone type (rather than folded into `FieldConfig`) so additional
//! predicate kinds can be added without widening the core config surface,
//! mirroring the teacher's separate `Predicate` enum in
//! `crates/segmentation/src/predicates.rs`.

use mdm_core::types::NormalizedRecord;

#[derive(Debug, Clone)]
pub enum ConditionalRule {
    /// Always selects the base comparator.
    Always,
    /// Selects the alternate comparator only when both records' `field`
    /// equals `value` (case-sensitive, exact text match).
    FieldEquals { field: String, value: String },
    /// Selects the alternate comparator when `field` is present on both
    /// sides (non-null).
    BothPresent { field: String },
}

impl ConditionalRule {
    pub fn matches(&self, left: &NormalizedRecord, right: &NormalizedRecord) -> bool {
        match self {
            ConditionalRule::Always => true,
            ConditionalRule::FieldEquals { field, value } => {
                let lv = left.normalized.get(field).and_then(|v| v.as_text());
                let rv = right.normalized.get(field).and_then(|v| v.as_text());
                lv.as_deref() == Some(value.as_str()) && rv.as_deref() == Some(value.as_str())
            }
            ConditionalRule::BothPresent { field } => {
                let lv = left.normalized.get(field).map(|v| !v.is_null()).unwrap_or(false);
                let rv = right.normalized.get(field).map(|v| !v.is_null()).unwrap_or(false);
                lv && rv
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdm_core::types::{AttributeValue, Attributes, Record};
    use std::collections::BTreeMap;

    fn normalized(country: &str) -> NormalizedRecord {
        let mut attrs: Attributes = BTreeMap::new();
        attrs.insert(
            "country".to_string(),
            AttributeValue::String(country.to_string()),
        );
        let record = Record {
            record_id: "r".to_string(),
            source_id: "crm".to_string(),
            attributes: attrs.clone(),
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        };
        NormalizedRecord::new(record, attrs, BTreeMap::new())
    }

    #[test]
    fn field_equals_matches_when_both_sides_agree() {
        let rule = ConditionalRule::FieldEquals {
            field: "country".to_string(),
            value: "US".to_string(),
        };
        assert!(rule.matches(&normalized("US"), &normalized("US")));
        assert!(!rule.matches(&normalized("US"), &normalized("CA")));
    }

    #[test]
    fn always_rule_always_matches() {
        assert!(ConditionalRule::Always.matches(&normalized("US"), &normalized("CA")));
    }
}
