//! Individual transforms and the name → implementation lookup.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

pub trait Transform: Send + Sync {
    fn apply(&self, input: &str) -> Result<String, String>;
}

struct Lower;
impl Transform for Lower {
    fn apply(&self, input: &str) -> Result<String, String> {
        Ok(input.to_lowercase())
    }
}

struct Strip;
impl Transform for Strip {
    fn apply(&self, input: &str) -> Result<String, String> {
        Ok(input.trim().to_string())
    }
}

struct CollapseWhitespace;
impl Transform for CollapseWhitespace {
    fn apply(&self, input: &str) -> Result<String, String> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"\s+").unwrap());
        Ok(re.replace_all(input.trim(), " ").into_owned())
    }
}

/// Normalizes a phone number to E.164 using a fixed default region (`+1`)
/// when the input carries no country code. This is deliberately a simple
/// digit-extraction normalizer, not a full libphonenumber port.
struct NormalizePhone;
impl Transform for NormalizePhone {
    fn apply(&self, input: &str) -> Result<String, String> {
        let has_plus = input.trim_start().starts_with('+');
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err("no digits found in phone value".to_string());
        }
        if has_plus {
            return Ok(format!("+{digits}"));
        }
        match digits.len() {
            10 => Ok(format!("+1{digits}")),
            11 if digits.starts_with('1') => Ok(format!("+{digits}")),
            _ => Ok(format!("+{digits}")),
        }
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%b-%Y"];

struct NormalizeDate;
impl Transform for NormalizeDate {
    fn apply(&self, input: &str) -> Result<String, String> {
        let trimmed = input.trim();
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
                return Ok(date.format("%Y-%m-%d").to_string());
            }
        }
        Err(format!("could not parse '{trimmed}' as a date"))
    }
}

/// Looks up a transform by its configured name, including any custom
/// transforms registered via [`custom_transform_registry`].
pub fn resolve(name: &str) -> Option<Box<dyn Transform>> {
    match name {
        "lower" => Some(Box::new(Lower)),
        "strip" => Some(Box::new(Strip)),
        "collapse_whitespace" => Some(Box::new(CollapseWhitespace)),
        "normalize_phone" => Some(Box::new(NormalizePhone)),
        "normalize_date" => Some(Box::new(NormalizeDate)),
        other => custom_transform_registry().get(other).map(|f| f()),
    }
}

/// Registry of custom transforms, populated by integrators at startup.
/// Empty by default; kept as a free function (rather than a static map
/// alone) so callers can extend it the way the teacher's
/// `ConnectorRegistry` allows runtime registration of new adapters.
pub fn custom_transform_registry() -> &'static std::collections::HashMap<
    &'static str,
    fn() -> Box<dyn Transform>,
> {
    static REGISTRY: OnceLock<std::collections::HashMap<&'static str, fn() -> Box<dyn Transform>>> =
        OnceLock::new();
    REGISTRY.get_or_init(std::collections::HashMap::new)
}
