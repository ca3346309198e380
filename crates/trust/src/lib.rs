//! Trust Scorer: computes source reliability, completeness, timeliness,
//! and validity per normalized record, then a configured weighted sum.

use std::collections::HashMap;

use chrono::Utc;
use regex::Regex;

use mdm_core::config::{FieldConfig, SourceConfig, TrustConfig};
use mdm_core::types::{NormalizedRecord, TrustScore};

pub struct TrustScorer {
    reliability_by_source: HashMap<String, f64>,
    fields: Vec<FieldConfig>,
    validators: HashMap<String, Regex>,
    config: TrustConfig,
}

impl TrustScorer {
    pub fn new(sources: &[SourceConfig], fields: Vec<FieldConfig>, config: TrustConfig) -> Self {
        let reliability_by_source = sources
            .iter()
            .map(|s| (s.source_id.clone(), s.reliability))
            .collect();
        let validators = fields
            .iter()
            .filter_map(|f| {
                f.validation_regex
                    .as_ref()
                    .and_then(|pattern| Regex::new(pattern).ok())
                    .map(|re| (f.name.clone(), re))
            })
            .collect();
        Self {
            reliability_by_source,
            fields,
            validators,
            config,
        }
    }

    pub fn score(&self, record: &NormalizedRecord) -> TrustScore {
        let source_reliability = self
            .reliability_by_source
            .get(record.source_id())
            .copied()
            .unwrap_or(0.0);

        let completeness = self.completeness(record);
        let timeliness = self.timeliness(record);
        let validity = self.validity(record);

        let overall = self.config.source_reliability_weight * source_reliability
            + self.config.completeness_weight * completeness
            + self.config.timeliness_weight * timeliness
            + self.config.validity_weight * validity;

        TrustScore {
            source_reliability,
            completeness,
            timeliness,
            validity,
            overall,
        }
    }

    fn completeness(&self, record: &NormalizedRecord) -> f64 {
        let required: Vec<&FieldConfig> = self.fields.iter().filter(|f| f.required_for_match).collect();
        if required.is_empty() {
            return 1.0;
        }
        let total_weight: f64 = required.iter().map(|f| f.weight).sum();
        if total_weight <= 0.0 {
            return 1.0;
        }
        let present_weight: f64 = required
            .iter()
            .filter(|f| {
                record
                    .normalized
                    .get(&f.name)
                    .map(|v| !v.is_null())
                    .unwrap_or(false)
            })
            .map(|f| f.weight)
            .sum();
        present_weight / total_weight
    }

    fn timeliness(&self, record: &NormalizedRecord) -> f64 {
        let age_days = (Utc::now() - record.record.source_timestamp).num_seconds() as f64 / 86_400.0;
        let age_days = age_days.max(0.0);
        (-age_days / self.config.timeliness_half_life_days).exp()
    }

    fn validity(&self, record: &NormalizedRecord) -> f64 {
        if self.validators.is_empty() {
            return 1.0;
        }
        let total = self.validators.len() as f64;
        let passing = self
            .validators
            .iter()
            .filter(|(field, re)| {
                record
                    .normalized
                    .get(*field)
                    .and_then(|v| v.as_text())
                    .map(|text| re.is_match(&text))
                    .unwrap_or(false)
            })
            .count() as f64;
        passing / total
    }
}
