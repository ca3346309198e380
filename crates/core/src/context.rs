//! `PipelineContext`: the single object threaded through every pipeline
//! stage, replacing the global singletons the teacher's services reach for
//! (e.g. `IdentityGraph` owned directly by `AppState`). Bundles the loaded
//! config and a run-scoped identifier used to tag every metric and lineage
//! event emitted during one pipeline invocation.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: Arc<AppConfig>,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl PipelineContext {
    pub fn new(config: AppConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            config: Arc::new(config),
            run_id: Uuid::new_v4(),
            started_at,
        }
    }

    #[cfg(test)]
    pub fn for_test(config: AppConfig) -> Self {
        Self::new(config, Utc::now())
    }
}
