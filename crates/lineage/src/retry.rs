//! Exponential backoff for lineage write conflicts, grounded in the
//! teacher's `crates/cdp/src/connector_runtime.rs::RetryPolicy`.

use std::time::Duration;

use rand::Rng;

use mdm_core::config::LineageConfig;
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::metrics_sink::MetricsSink;

use crate::{LineageSink, Transaction};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&LineageConfig> for RetryPolicy {
    fn from(config: &LineageConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Full-jitter exponential backoff: `random(0, min(max_delay, base * 2^attempt))`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(20));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}

/// Commits `build_txn()`'s output, retrying on `MdmError::LineageConflict`
/// with exponential backoff up to `policy.max_attempts`. On persistent
/// failure, the error is returned so the caller can roll back the
/// surrounding merge and re-queue the affected cluster, per §7.
pub async fn commit_with_retry(
    sink: &dyn LineageSink,
    policy: RetryPolicy,
    mut build_txn: impl FnMut() -> Transaction,
) -> MdmResult<()> {
    let mut attempt = 0;
    loop {
        let txn = build_txn();
        match sink.commit(txn).await {
            Ok(()) => return Ok(()),
            Err(MdmError::LineageConflict { golden_id, reason }) => {
                attempt += 1;
                MetricsSink::incr_lineage_retries(1);
                if attempt >= policy.max_attempts {
                    return Err(MdmError::LineageConflict { golden_id, reason });
                }
                tokio::time::sleep(policy.backoff_for_attempt(attempt)).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
        };
        for attempt in 0..10 {
            assert!(policy.backoff_for_attempt(attempt) <= Duration::from_millis(500));
        }
    }
}
