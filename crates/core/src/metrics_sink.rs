//! Thin wrapper around the `metrics` facade, mirroring the teacher's
//! `analytics/logger.rs` use of `metrics::counter!`/`histogram!` at call
//! sites rather than threading a client handle through every function.

use std::time::Duration;

/// Named counters and histograms emitted by the pipeline stages. Kept as
/// plain `&'static str` constants (not an enum) so every crate can record a
/// metric without depending on `mdm-pipeline`.
pub struct MetricsSink;

impl MetricsSink {
    pub fn record_stage_duration(stage: &'static str, duration: Duration) {
        metrics::histogram!("mdm_stage_duration_seconds", "stage" => stage)
            .record(duration.as_secs_f64());
    }

    pub fn incr_records_processed(source_id: &str, count: u64) {
        metrics::counter!("mdm_records_processed_total", "source" => source_id.to_string())
            .increment(count);
    }

    pub fn incr_candidate_pairs(strategy: &'static str, count: u64) {
        metrics::counter!("mdm_candidate_pairs_total", "strategy" => strategy).increment(count);
    }

    pub fn incr_match_verdict(verdict: &'static str, count: u64) {
        metrics::counter!("mdm_match_verdicts_total", "verdict" => verdict).increment(count);
    }

    pub fn incr_merge_events(event_type: &'static str, count: u64) {
        metrics::counter!("mdm_merge_events_total", "event_type" => event_type).increment(count);
    }

    pub fn incr_lineage_retries(count: u64) {
        metrics::counter!("mdm_lineage_retries_total").increment(count);
    }

    pub fn set_block_size(strategy: &'static str, size: u64) {
        metrics::gauge!("mdm_block_size", "strategy" => strategy).set(size as f64);
    }
}

/// Installs the Prometheus exporter on the configured listen address.
/// Mirrors the teacher's `main.rs` pattern of wiring the exporter once at
/// process start, before any subsystem is constructed.
pub fn install_prometheus_exporter(listen_addr: &str) -> crate::error::MdmResult<()> {
    let addr: std::net::SocketAddr = listen_addr
        .parse()
        .map_err(|e| crate::error::MdmError::Config(format!("invalid metrics.listen_addr: {e}")))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| crate::error::MdmError::Internal(anyhow::anyhow!(e)))?;
    Ok(())
}
