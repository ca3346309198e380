//! Shared data model, configuration, error taxonomy, and metrics abstraction
//! for the MDM entity-resolution core.
//!
//! Every other `mdm-*` crate depends on this one; nothing in here depends on
//! blocking, matching, clustering, trust, survivorship, lineage, or pipeline.

pub mod config;
pub mod context;
pub mod error;
pub mod metrics_sink;
pub mod types;

pub use config::AppConfig;
pub use context::PipelineContext;
pub use error::{MdmError, MdmResult};
pub use metrics_sink::MetricsSink;
