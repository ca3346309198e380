//! Error taxonomy shared across the `mdm-*` crates, mirroring the teacher's
//! single `thiserror`-derived enum + `Result` alias pattern.

use thiserror::Error;

pub type MdmResult<T> = Result<T, MdmError>;

#[derive(Debug, Error)]
pub enum MdmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("preprocessing error on field '{field}': {reason}")]
    Preprocess { field: String, reason: String },

    #[error("blocking error: {0}")]
    Blocking(String),

    #[error("comparator '{name}' failed on field '{field}': {reason}")]
    Comparator {
        name: String,
        field: String,
        reason: String,
    },

    #[error("matching error: {0}")]
    Matching(String),

    #[error("clustering error: {0}")]
    Clustering(String),

    #[error("survivorship error on field '{field}': {reason}")]
    Survivorship { field: String, reason: String },

    #[error("lineage store conflict on golden_id {golden_id}: {reason}")]
    LineageConflict { golden_id: String, reason: String },

    #[error("lineage store error: {0}")]
    Lineage(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("ingestion error: {0}")]
    Ingestion(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MdmError {
    /// Short, stable code attached to a dead-lettered record so downstream
    /// consumers can filter without parsing the display string (spec §6:
    /// "routed to a dead-letter sink with a `VALIDATION_ERROR` reason").
    pub fn dead_letter_reason(&self) -> &'static str {
        match self {
            MdmError::Validation(_) => "VALIDATION_ERROR",
            MdmError::Preprocess { .. } => "PREPROCESS_ERROR",
            MdmError::Comparator { .. } => "COMPARATOR_ERROR",
            MdmError::Blocking(_) => "BLOCK_EXPLOSION",
            MdmError::Ingestion(_) => "INGESTION_ERROR",
            _ => "PIPELINE_ERROR",
        }
    }

    /// Process exit code convention used by `src/mdm-engine`: 0 success,
    /// 1 validation/config error, 2 data error (a stage failed on input it
    /// was given), 3 infrastructure error (lineage store, io, internal).
    pub fn exit_code(&self) -> i32 {
        match self {
            MdmError::Config(_) | MdmError::Validation(_) => 1,
            MdmError::Preprocess { .. }
            | MdmError::Blocking(_)
            | MdmError::Comparator { .. }
            | MdmError::Matching(_)
            | MdmError::Clustering(_)
            | MdmError::Survivorship { .. }
            | MdmError::Ingestion(_) => 2,
            MdmError::LineageConflict { .. }
            | MdmError::Lineage(_)
            | MdmError::Pipeline(_)
            | MdmError::Serialization(_)
            | MdmError::Io(_)
            | MdmError::Internal(_) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_convention() {
        assert_eq!(MdmError::Config("x".into()).exit_code(), 1);
        assert_eq!(
            MdmError::Blocking("explosion".into()).exit_code(),
            2
        );
        assert_eq!(
            MdmError::Lineage("write failed".into()).exit_code(),
            3
        );
    }

    #[test]
    fn validation_errors_carry_the_spec_named_reason_code() {
        assert_eq!(
            MdmError::Validation("name is required".into()).dead_letter_reason(),
            "VALIDATION_ERROR"
        );
    }
}
