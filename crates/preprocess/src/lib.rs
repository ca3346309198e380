//! Per-field normalization pipeline: derives a [`NormalizedRecord`] from a
//! [`Record`] by applying an ordered list of transforms per configured
//! field. Input is never mutated; the result is cached on the output
//! record, matching the teacher's "derive once, never mutate" convention
//! used throughout `crates/cdp`.

mod transforms;

pub use transforms::{custom_transform_registry, Transform};

use std::collections::BTreeMap;

use mdm_core::config::FieldConfig;
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::{Attributes, NormalizedRecord, Record};

/// Applies each field's configured transform chain to produce a
/// `NormalizedRecord`. Fields absent from `fields` pass through unmodified
/// into the normalized map so later stages can still reference them.
pub struct Preprocessor {
    fields: Vec<FieldConfig>,
}

impl Preprocessor {
    pub fn new(fields: Vec<FieldConfig>) -> MdmResult<Self> {
        for field in &fields {
            for name in &field.transforms {
                if transforms::resolve(name).is_none() {
                    return Err(MdmError::Config(format!(
                        "field '{}' references unknown transform '{name}'",
                        field.name
                    )));
                }
            }
        }
        Ok(Self { fields })
    }

    /// Validates the record against each field's schema before any
    /// transform runs. A `required_for_match` field that is absent or
    /// explicitly `Null` fails schema validation (spec §6): the ingestion
    /// iterator routes such a record to the dead-letter sink with a
    /// `VALIDATION_ERROR` reason instead of letting it reach blocking with
    /// a field the Match Engine cannot score.
    fn validate_schema(&self, record: &Record) -> MdmResult<()> {
        for field in &self.fields {
            if !field.required_for_match {
                continue;
            }
            let is_present = record
                .attributes
                .get(&field.name)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !is_present {
                return Err(MdmError::Validation(format!(
                    "required field '{}' is missing or null on record '{}'",
                    field.name, record.record_id
                )));
            }
        }
        Ok(())
    }

    pub fn normalize(&self, record: Record) -> MdmResult<NormalizedRecord> {
        self.validate_schema(&record)?;

        let mut normalized: Attributes = record.attributes.clone();

        for field in &self.fields {
            let Some(value) = record.attributes.get(&field.name) else {
                continue;
            };
            let Some(mut text) = value.as_text() else {
                continue;
            };
            for transform_name in &field.transforms {
                let transform = transforms::resolve(transform_name).ok_or_else(|| {
                    MdmError::Preprocess {
                        field: field.name.clone(),
                        reason: format!("unknown transform '{transform_name}'"),
                    }
                })?;
                text = transform.apply(&text).map_err(|reason| MdmError::Preprocess {
                    field: field.name.clone(),
                    reason,
                })?;
            }
            normalized.insert(
                field.name.clone(),
                mdm_core::types::AttributeValue::String(text),
            );
        }

        Ok(NormalizedRecord::new(record, normalized, BTreeMap::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdm_core::types::AttributeValue;

    fn field(name: &str, transforms: &[&str]) -> FieldConfig {
        FieldConfig {
            name: name.to_string(),
            transforms: transforms.iter().map(|s| s.to_string()).collect(),
            comparator: "exact".to_string(),
            weight: 1.0,
            required_for_match: false,
            null_policy: Default::default(),
            validation_regex: None,
            comparator_params: serde_json::json!({}),
        }
    }

    fn record(attrs: Attributes) -> Record {
        Record {
            record_id: "r1".to_string(),
            source_id: "crm".to_string(),
            attributes: attrs,
            ingest_time: Utc::now(),
            source_timestamp: Utc::now(),
        }
    }

    #[test]
    fn applies_lower_and_strip_in_order() {
        let pre = Preprocessor::new(vec![field("name", &["strip", "lower"])]).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert(
            "name".to_string(),
            AttributeValue::String("  ACME Corp  ".to_string()),
        );
        let normalized = pre.normalize(record(attrs)).unwrap();
        assert_eq!(
            normalized.normalized.get("name"),
            Some(&AttributeValue::String("acme corp".to_string()))
        );
    }

    #[test]
    fn collapse_whitespace_normalizes_internal_gaps() {
        let pre = Preprocessor::new(vec![field("name", &["collapse_whitespace"])]).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert(
            "name".to_string(),
            AttributeValue::String("Acme   Corp".to_string()),
        );
        let normalized = pre.normalize(record(attrs)).unwrap();
        assert_eq!(
            normalized.normalized.get("name"),
            Some(&AttributeValue::String("Acme Corp".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_transform_at_construction() {
        let err = Preprocessor::new(vec![field("name", &["reverse_everything"])]);
        assert!(err.is_err());
    }

    #[test]
    fn input_record_is_untouched() {
        let pre = Preprocessor::new(vec![field("name", &["lower"])]).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert(
            "name".to_string(),
            AttributeValue::String("ACME".to_string()),
        );
        let original = record(attrs);
        let before = original.clone();
        let normalized = pre.normalize(original).unwrap();
        assert_eq!(normalized.record, before);
    }

    #[test]
    fn required_field_null_fails_schema_validation() {
        let mut required = field("name", &["lower"]);
        required.required_for_match = true;
        let pre = Preprocessor::new(vec![required]).unwrap();

        let mut attrs = Attributes::new();
        attrs.insert("name".to_string(), AttributeValue::Null);
        let err = pre.normalize(record(attrs)).unwrap_err();
        assert!(matches!(err, MdmError::Validation(_)));
        assert_eq!(err.dead_letter_reason(), "VALIDATION_ERROR");
    }

    #[test]
    fn required_field_absent_fails_schema_validation() {
        let mut required = field("name", &[]);
        required.required_for_match = true;
        let pre = Preprocessor::new(vec![required]).unwrap();

        let err = pre.normalize(record(Attributes::new())).unwrap_err();
        assert!(matches!(err, MdmError::Validation(_)));
    }

    #[test]
    fn non_required_field_null_is_not_a_validation_error() {
        let pre = Preprocessor::new(vec![field("name", &["lower"])]).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("name".to_string(), AttributeValue::Null);
        assert!(pre.normalize(record(attrs)).is_ok());
    }
}
