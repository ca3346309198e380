use mdm_core::error::MdmResult;
use mdm_core::types::AttributeValue;

use crate::fuzzy::{jaro_winkler, normalized_levenshtein};
use crate::{clamp_score, Comparator};

struct AddressComponents {
    number: Option<String>,
    street: Option<String>,
    street_type: Option<String>,
    city: Option<String>,
    region: Option<String>,
    postal: Option<String>,
}

const STREET_TYPES: &[&str] = &[
    "st", "street", "ave", "avenue", "blvd", "boulevard", "rd", "road", "dr", "drive", "ln",
    "lane", "ct", "court", "pl", "place", "way", "cir", "circle", "ter", "terrace",
];

/// Splits a free-text address into {number, street, type, city, region,
/// postal} on a best-effort basis. Input is expected to be roughly
/// "123 Main St, Springfield, IL 62704"; components that can't be located
/// are left absent rather than guessed.
fn parse_address(text: &str) -> AddressComponents {
    let mut number = None;
    let mut street = None;
    let mut street_type = None;
    let mut city = None;
    let mut region = None;
    let mut postal = None;

    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if let Some(street_part) = parts.first() {
        let tokens: Vec<&str> = street_part.split_whitespace().collect();
        let mut idx = 0;
        if let Some(first) = tokens.first() {
            if first.chars().all(|c| c.is_ascii_digit()) {
                number = Some(first.to_string());
                idx = 1;
            }
        }
        if idx < tokens.len() {
            let last = tokens[tokens.len() - 1].to_lowercase();
            let last_clean = last.trim_end_matches('.');
            if STREET_TYPES.contains(&last_clean) {
                street_type = Some(last_clean.to_string());
                street = Some(tokens[idx..tokens.len() - 1].join(" "));
            } else {
                street = Some(tokens[idx..].join(" "));
            }
        }
    }
    if let Some(city_part) = parts.get(1) {
        city = Some(city_part.to_string());
    }
    if let Some(region_part) = parts.get(2) {
        let tokens: Vec<&str> = region_part.split_whitespace().collect();
        if let Some(first) = tokens.first() {
            region = Some(first.to_string());
        }
        if let Some(rest) = tokens.get(1) {
            postal = Some(rest.to_string());
        }
    }

    AddressComponents {
        number,
        street,
        street_type,
        city,
        region,
        postal,
    }
}

fn component_score(a: &Option<String>, b: &Option<String>, fuzzy: bool) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (a, b) = (a.to_lowercase(), b.to_lowercase());
            Some(if fuzzy {
                jaro_winkler(&a, &b)
            } else if a == b {
                1.0
            } else {
                normalized_levenshtein(&a, &b)
            })
        }
        (None, None) => None,
        _ => Some(0.0),
    }
}

/// Component weights fixed by the spec: number .25, street .35, type .15,
/// city .15, region .05, postal .05.
const WEIGHTS: [(&str, f64); 6] = [
    ("number", 0.25),
    ("street", 0.35),
    ("type", 0.15),
    ("city", 0.15),
    ("region", 0.05),
    ("postal", 0.05),
];

pub struct AddressComparator {
    id: String,
}

impl AddressComparator {
    pub fn new() -> Self {
        Self {
            id: "address".to_string(),
        }
    }
}

impl Default for AddressComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for AddressComparator {
    fn id(&self) -> &str {
        &self.id
    }

    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64> {
        let (a, b) = match (left.as_text(), right.as_text()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(0.0),
        };
        let pa = parse_address(&a);
        let pb = parse_address(&b);

        let scores = [
            component_score(&pa.number, &pb.number, false),
            component_score(&pa.street, &pb.street, true),
            component_score(&pa.street_type, &pb.street_type, false),
            component_score(&pa.city, &pb.city, true),
            component_score(&pa.region, &pb.region, false),
            component_score(&pa.postal, &pb.postal, false),
        ];

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for ((_, weight), score) in WEIGHTS.iter().zip(scores.iter()) {
            if let Some(score) = score {
                numerator += weight * score;
                denominator += weight;
            }
        }
        if denominator == 0.0 {
            return Ok(0.0);
        }
        Ok(clamp_score(numerator / denominator))
    }
}
