use mdm_core::error::MdmResult;
use mdm_core::types::AttributeValue;

use crate::Comparator;

pub struct ExactComparator {
    id: String,
    case_fold: bool,
}

impl ExactComparator {
    pub fn new(case_fold: bool) -> Self {
        Self {
            id: if case_fold {
                "exact:case_fold".to_string()
            } else {
                "exact".to_string()
            },
            case_fold,
        }
    }

    pub(crate) fn from_params(params: &serde_json::Value) -> Self {
        let case_fold = params
            .get("case_fold")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        Self::new(case_fold)
    }
}

impl Comparator for ExactComparator {
    fn id(&self) -> &str {
        &self.id
    }

    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64> {
        let equal = match (left.as_text(), right.as_text()) {
            (Some(a), Some(b)) if self.case_fold => a.to_lowercase() == b.to_lowercase(),
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        };
        Ok(if equal { 1.0 } else { 0.0 })
    }
}
