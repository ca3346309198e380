//! Field-level similarity comparators.
//!
//! Every comparator implements [`Comparator`]: a pure, deterministic
//! `(left, right) -> score in [0, 1]` function plus a stable string
//! identifier. Follows the teacher's `CdpAdapter` trait + per-variant struct
//! + factory-function shape (`crates/cdp/src/adapters.rs`).

mod address;
mod date;
mod exact;
mod fuzzy;
mod numeric;
mod phonetic;
mod vector;

pub use address::AddressComparator;
pub use date::DateComparator;
pub use exact::ExactComparator;
pub use fuzzy::{FuzzyComparator, FuzzyMethod};
pub use numeric::NumericComparator;
pub use phonetic::{PhoneticComparator, PhoneticMethod};
pub use vector::VectorComparator;

use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::AttributeValue;

/// A pure, deterministic, thread-safe field-level similarity function.
pub trait Comparator: Send + Sync {
    /// Stable identifier persisted on `MatchDecision`s (e.g. `"fuzzy:jaro_winkler"`).
    fn id(&self) -> &str;

    /// Compares two values, returning a score in `[0, 1]`.
    fn compare(&self, left: &AttributeValue, right: &AttributeValue) -> MdmResult<f64>;
}

/// Builds a comparator from its configured name and JSON parameters,
/// mirroring `crates/cdp/src/adapters.rs::create_adapter`.
pub fn create_comparator(name: &str, params: &serde_json::Value) -> MdmResult<Box<dyn Comparator>> {
    match name {
        "exact" => Ok(Box::new(ExactComparator::from_params(params))),
        "fuzzy" => Ok(Box::new(FuzzyComparator::from_params(params)?)),
        "phonetic" => Ok(Box::new(PhoneticComparator::from_params(params)?)),
        "numeric" => Ok(Box::new(NumericComparator::from_params(params)?)),
        "date" => Ok(Box::new(DateComparator::from_params(params)?)),
        "address" => Ok(Box::new(AddressComparator::new())),
        "vector" => Ok(Box::new(VectorComparator::from_params(params)?)),
        other => Err(MdmError::Config(format!("unknown comparator '{other}'"))),
    }
}

/// Clamps a raw score into the valid `[0, 1]` range, guarding against
/// floating point drift in the fuzzy/numeric/date comparators.
pub(crate) fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 1.0)
}
