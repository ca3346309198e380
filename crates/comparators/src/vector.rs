use mdm_core::error::MdmResult;
use mdm_core::types::AttributeValue;

use crate::{clamp_score, create_comparator, Comparator};

/// Cosine similarity over pre-computed embedding vectors. Vectors are not
/// carried on `AttributeValue` itself (the data model keeps embeddings in
/// `NormalizedRecord::embeddings`, keyed by field); the Match Engine passes
/// them in as JSON-encoded number arrays when present, and otherwise passes
/// through the raw field value so this comparator can fall back to a
/// configured textual comparator.
pub struct VectorComparator {
    id: String,
    fallback: Box<dyn Comparator>,
}

impl VectorComparator {
    pub fn new(fallback: Box<dyn Comparator>) -> Self {
        Self {
            id: "vector".to_string(),
            fallback,
        }
    }

    pub(crate) fn from_params(params: &serde_json::Value) -> MdmResult<Self> {
        let fallback_name = params
            .get("fallback")
            .and_then(|v| v.as_str())
            .unwrap_or("fuzzy");
        let fallback_params = params
            .get("fallback_params")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        Ok(Self::new(create_comparator(fallback_name, &fallback_params)?))
    }

    fn as_vector(value: &AttributeValue) -> Option<Vec<f32>> {
        match value {
            AttributeValue::Sequence(items) => items
                .iter()
                .map(|v| match v {
                    AttributeValue::Number(n) => Some(*n as f32),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

impl Comparator for VectorComparator {
    fn id(&self) -> &str {
        &self.id
    }

    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64> {
        match (Self::as_vector(left), Self::as_vector(right)) {
            (Some(a), Some(b)) if !a.is_empty() && a.len() == b.len() => {
                Ok(clamp_score(cosine_similarity(&a, &b)))
            }
            _ => self.fallback.compare(left, right),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    // cosine similarity in [-1, 1]; rescale to [0, 1] for the comparator contract
    let cos = dot / (norm_a * norm_b);
    (cos + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExactComparator;

    #[test]
    fn identical_vectors_score_one() {
        let cmp = VectorComparator::new(Box::new(ExactComparator::new(true)));
        let a = AttributeValue::Sequence(vec![
            AttributeValue::Number(1.0),
            AttributeValue::Number(0.0),
        ]);
        let b = a.clone();
        assert!((cmp.compare(&a, &b).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_half() {
        let cmp = VectorComparator::new(Box::new(ExactComparator::new(true)));
        let a = AttributeValue::Sequence(vec![
            AttributeValue::Number(1.0),
            AttributeValue::Number(0.0),
        ]);
        let b = AttributeValue::Sequence(vec![
            AttributeValue::Number(0.0),
            AttributeValue::Number(1.0),
        ]);
        assert!((cmp.compare(&a, &b).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_textual_comparator_when_absent() {
        let cmp = VectorComparator::new(Box::new(ExactComparator::new(true)));
        let a = AttributeValue::String("hello".to_string());
        let b = AttributeValue::String("hello".to_string());
        assert_eq!(cmp.compare(&a, &b).unwrap(), 1.0);
    }
}
