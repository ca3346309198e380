use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::AttributeValue;

use crate::{clamp_score, Comparator};

pub struct NumericComparator {
    id: String,
    tolerance: f64,
}

impl NumericComparator {
    pub fn new(tolerance: f64) -> MdmResult<Self> {
        if !(tolerance > 0.0) {
            return Err(MdmError::Config(
                "numeric comparator requires tolerance > 0".to_string(),
            ));
        }
        Ok(Self {
            id: "numeric".to_string(),
            tolerance,
        })
    }

    pub(crate) fn from_params(params: &serde_json::Value) -> MdmResult<Self> {
        let tolerance = params
            .get("tolerance")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                MdmError::Config("numeric comparator missing required 'tolerance' param".to_string())
            })?;
        Self::new(tolerance)
    }
}

impl Comparator for NumericComparator {
    fn id(&self) -> &str {
        &self.id
    }

    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64> {
        match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => {
                Ok(clamp_score(1.0 - (a - b).abs() / self.tolerance))
            }
            _ => Ok(0.0),
        }
    }
}
