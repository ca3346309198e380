use chrono::NaiveDate;
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::AttributeValue;

use crate::{clamp_score, Comparator};

const HEURISTIC_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%b-%Y"];

pub struct DateComparator {
    id: String,
    window_days: f64,
    format: Option<String>,
}

impl DateComparator {
    pub fn new(window_days: f64, format: Option<String>) -> MdmResult<Self> {
        if !(window_days > 0.0) {
            return Err(MdmError::Config(
                "date comparator requires window_days > 0".to_string(),
            ));
        }
        Ok(Self {
            id: "date".to_string(),
            window_days,
            format,
        })
    }

    pub(crate) fn from_params(params: &serde_json::Value) -> MdmResult<Self> {
        let window_days = params
            .get("window_days")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                MdmError::Config("date comparator missing required 'window_days' param".to_string())
            })?;
        let format = params
            .get("format")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self::new(window_days, format)
    }

    fn parse(&self, value: &AttributeValue) -> Option<NaiveDate> {
        if let AttributeValue::Date(d) = value {
            return Some(*d);
        }
        if let AttributeValue::Timestamp(t) = value {
            return Some(t.date_naive());
        }
        let text = value.as_text()?;
        if let Some(fmt) = &self.format {
            if let Ok(d) = NaiveDate::parse_from_str(&text, fmt) {
                return Some(d);
            }
        }
        HEURISTIC_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
    }
}

impl Comparator for DateComparator {
    fn id(&self) -> &str {
        &self.id
    }

    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64> {
        match (self.parse(left), self.parse(right)) {
            (Some(a), Some(b)) => {
                let days_diff = (a - b).num_days().unsigned_abs() as f64;
                Ok(clamp_score(1.0 - days_diff / self.window_days))
            }
            _ => Ok(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_dates_score_partial() {
        let cmp = DateComparator::new(30.0, None).unwrap();
        let a = AttributeValue::String("2024-01-01".to_string());
        let b = AttributeValue::String("2024-01-16".to_string());
        assert!((cmp.compare(&a, &b).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unparseable_date_scores_zero() {
        let cmp = DateComparator::new(30.0, None).unwrap();
        let a = AttributeValue::String("not a date".to_string());
        let b = AttributeValue::String("2024-01-16".to_string());
        assert_eq!(cmp.compare(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn alternate_heuristic_format_parses() {
        let cmp = DateComparator::new(1.0, None).unwrap();
        let a = AttributeValue::String("01/02/2024".to_string());
        let b = AttributeValue::String("2024-01-02".to_string());
        assert_eq!(cmp.compare(&a, &b).unwrap(), 1.0);
    }
}
