//! Registry for custom survivorship functions: pure functions over a
//! field's observations that return a surviving value, registered by
//! integrators at startup. Mirrors `mdm_preprocess::custom_transform_registry`.

use std::collections::HashMap;
use std::sync::OnceLock;

use mdm_core::types::{AttributeValue, RecordId};

use crate::FieldObservation;

pub type CustomStrategy = fn(&[FieldObservation]) -> (AttributeValue, String, RecordId, String);

pub fn custom_strategy_registry() -> &'static HashMap<&'static str, CustomStrategy> {
    static REGISTRY: OnceLock<HashMap<&'static str, CustomStrategy>> = OnceLock::new();
    REGISTRY.get_or_init(HashMap::new)
}
