//! Layered application configuration, following the teacher's pattern of one
//! nested struct per concern, each field defaulted via a standalone
//! `default_xxx()` function so that a partial TOML file or a partial set of
//! environment overrides both deserialize cleanly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MdmError, MdmResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub survivorship: SurvivorshipConfig,
    #[serde(default)]
    pub lineage: LineageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

fn default_fields() -> Vec<FieldConfig> {
    Vec::new()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            fields: default_fields(),
            blocking: BlockingConfig::default(),
            thresholds: ThresholdConfig::default(),
            trust: TrustConfig::default(),
            survivorship: SurvivorshipConfig::default(),
            lineage: LineageConfig::default(),
            metrics: MetricsConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration layered, lowest precedence first: built-in
    /// defaults, an optional TOML file, then `MDM__`-prefixed environment
    /// variables (`__` as the nesting separator, matching the teacher's
    /// `CAMPAIGN_EXPRESS__` convention).
    pub fn load(path: Option<&Path>) -> MdmResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MDM")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );
        let raw = builder
            .build()
            .map_err(|e| MdmError::Config(e.to_string()))?;
        raw.try_deserialize()
            .map_err(|e| MdmError::Config(e.to_string()))
    }
}

/// One registered source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    #[serde(default = "default_source_reliability")]
    pub reliability: f64,
    #[serde(default)]
    pub precedence: i32,
}

fn default_source_reliability() -> f64 {
    0.5
}

/// How one attribute participates in preprocessing, blocking, and matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub transforms: Vec<String>,
    #[serde(default = "default_comparator")]
    pub comparator: String,
    #[serde(default = "default_field_weight")]
    pub weight: f64,
    #[serde(default)]
    pub required_for_match: bool,
    #[serde(default)]
    pub null_policy: NullPolicy,
    /// Regex the field's normalized text must match to count as "valid"
    /// for the trust scorer's validity component. Absent means the field
    /// is not validated (and so never penalizes validity).
    #[serde(default)]
    pub validation_regex: Option<String>,
    /// Comparator-specific parameters (e.g. numeric's `tolerance`, date's
    /// `window_days`, fuzzy's `method`), passed through verbatim to
    /// `mdm_comparators::create_comparator`. An empty object for
    /// comparators that take no parameters (`exact`, `address`).
    #[serde(default = "default_comparator_params")]
    pub comparator_params: serde_json::Value,
}

fn default_comparator_params() -> serde_json::Value {
    serde_json::json!({})
}

fn default_comparator() -> String {
    "exact".to_string()
}

fn default_field_weight() -> f64 {
    1.0
}

/// Wire tokens (`skip`, `treat_as_mismatch`, `treat_nulls_equal`) match the
/// field names used in the configuration surface documented for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[default]
    Skip,
    TreatAsMismatch,
    TreatNullsEqual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_block_keys")]
    pub keys: Vec<String>,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
}

fn default_strategy() -> String {
    "standard".to_string()
}

fn default_block_keys() -> Vec<String> {
    Vec::new()
}

fn default_window_size() -> usize {
    10
}

fn default_max_block_size() -> usize {
    5_000
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            keys: default_block_keys(),
            window_size: default_window_size(),
            max_block_size: default_max_block_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default = "default_aggregation")]
    pub aggregation: String,
    /// Refuses to union two clusters if any cross-cluster pair has a
    /// recorded NO_MATCH, demoting the weaker edge to REVIEW instead.
    #[serde(default = "default_transitivity_guard_enabled")]
    pub transitivity_guard_enabled: bool,
}

fn default_match_threshold() -> f64 {
    0.85
}

fn default_review_threshold() -> f64 {
    0.65
}

fn default_aggregation() -> String {
    "weighted_average".to_string()
}

fn default_transitivity_guard_enabled() -> bool {
    true
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            review_threshold: default_review_threshold(),
            aggregation: default_aggregation(),
            transitivity_guard_enabled: default_transitivity_guard_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default = "default_trust_weight")]
    pub source_reliability_weight: f64,
    #[serde(default = "default_trust_weight")]
    pub completeness_weight: f64,
    #[serde(default = "default_trust_weight")]
    pub timeliness_weight: f64,
    #[serde(default = "default_trust_weight")]
    pub validity_weight: f64,
    #[serde(default = "default_half_life_days")]
    pub timeliness_half_life_days: f64,
}

fn default_trust_weight() -> f64 {
    0.25
}

fn default_half_life_days() -> f64 {
    90.0
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            source_reliability_weight: default_trust_weight(),
            completeness_weight: default_trust_weight(),
            timeliness_weight: default_trust_weight(),
            validity_weight: default_trust_weight(),
            timeliness_half_life_days: default_half_life_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivorshipConfig {
    #[serde(default = "default_survivorship_strategy")]
    pub default_strategy: String,
    #[serde(default)]
    pub field_overrides: std::collections::BTreeMap<String, String>,
}

fn default_survivorship_strategy() -> String {
    "most_trusted".to_string()
}

impl Default for SurvivorshipConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_survivorship_strategy(),
            field_overrides: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageBackend {
    #[default]
    InMemory,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageConfig {
    #[serde(default)]
    pub backend: LineageBackend,
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl LineageConfig {
    pub fn backend_is_external(&self) -> bool {
        self.backend == LineageBackend::External
    }
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    50
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            backend: LineageBackend::default(),
            max_retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9898".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_comparator_cache_capacity")]
    pub comparator_cache_capacity: u64,
}

fn default_worker_threads() -> usize {
    num_cpus_fallback()
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_comparator_cache_capacity() -> u64 {
    100_000
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            comparator_cache_capacity: default_comparator_cache_capacity(),
        }
    }
}
