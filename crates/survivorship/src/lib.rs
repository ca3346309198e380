//! Survivor: reduces a cluster of NormalizedRecords (plus trust scores)
//! into one GoldenRecord, attribute by attribute. Generalizes
//! `crates/cdp/src/identity.rs::should_update_field` (a single
//! source-precedence rule) into the full strategy set the spec names.

mod custom;
mod golden_id;
mod strategies;

pub use custom::{custom_strategy_registry, CustomStrategy};
pub use golden_id::{assign_merge_survivor, MergeSurvivor};

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use mdm_core::config::SurvivorshipConfig;
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::{
    AttributeProvenance, AttributeValue, Attributes, GoldenRecord, NormalizedRecord, RecordId,
};

/// One source record's contribution to a field, carrying the metadata
/// survivorship tie-breaks need.
#[derive(Debug, Clone)]
pub struct FieldObservation {
    pub value: AttributeValue,
    pub source_id: String,
    pub record_id: RecordId,
    pub trust: f64,
    pub source_timestamp: chrono::DateTime<Utc>,
}

pub struct Survivor {
    config: SurvivorshipConfig,
    source_precedence: Vec<String>,
}

impl Survivor {
    pub fn new(config: SurvivorshipConfig, source_precedence: Vec<String>) -> Self {
        Self {
            config,
            source_precedence,
        }
    }

    fn strategy_for(&self, field: &str) -> &str {
        self.config
            .field_overrides
            .get(field)
            .map(String::as_str)
            .unwrap_or(&self.config.default_strategy)
    }

    /// Builds a golden record from a cluster's normalized records. `cluster_id`
    /// is the union-find root identifying the cluster; `golden_id` is `None`
    /// for a brand-new cluster (assigned a fresh UUID) or `Some` to update an
    /// existing golden record in place (version incremented by the caller,
    /// which owns the lineage write).
    pub fn build_golden_record(
        &self,
        cluster_id: RecordId,
        members: &[NormalizedRecord],
        existing: Option<&GoldenRecord>,
    ) -> MdmResult<GoldenRecord> {
        let mut field_names: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for member in members {
            field_names.extend(member.normalized.keys().cloned());
        }

        let mut attributes: Attributes = BTreeMap::new();
        let mut provenance: BTreeMap<String, AttributeProvenance> = BTreeMap::new();

        for field in field_names {
            let observations: Vec<FieldObservation> = members
                .iter()
                .filter_map(|m| {
                    let value = m.normalized.get(&field)?;
                    if value.is_null() {
                        return None;
                    }
                    Some(FieldObservation {
                        value: value.clone(),
                        source_id: m.source_id().clone(),
                        record_id: m.record_id().clone(),
                        trust: m.trust.map(|t| t.overall).unwrap_or(0.0),
                        source_timestamp: m.record.source_timestamp,
                    })
                })
                .collect();
            if observations.is_empty() {
                continue;
            }

            let strategy = self.strategy_for(&field);
            if let Some((value, rule, record_id, source_id)) = strategies::select(
                strategy,
                &observations,
                &self.source_precedence,
            )? {
                attributes.insert(field.clone(), value);
                provenance.insert(
                    field,
                    AttributeProvenance {
                        record_id,
                        source_id,
                        rule,
                    },
                );
            }
        }

        let now = Utc::now();
        Ok(match existing {
            Some(golden) => GoldenRecord {
                golden_id: golden.golden_id,
                attributes,
                provenance,
                cluster_id,
                created_at: golden.created_at,
                updated_at: now,
                version: golden.version + 1,
            },
            None => GoldenRecord {
                golden_id: Uuid::new_v4(),
                attributes,
                provenance,
                cluster_id,
                created_at: now,
                updated_at: now,
                version: 1,
            },
        })
    }
}

pub(crate) fn config_error(msg: impl Into<String>) -> MdmError {
    MdmError::Survivorship {
        field: "<unknown>".to_string(),
        reason: msg.into(),
    }
}
