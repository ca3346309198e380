//! Candidate-pair generation. Three strategies, generalizing the teacher's
//! `index_key`/`DashMap` identity-index pattern in
//! `crates/cdp/src/identity.rs` from a single exact key to standard,
//! sorted-neighborhood, and LSH-over-vectors blocking.

mod combined;
mod lsh;
mod sorted_neighborhood;
mod standard;

pub use combined::CombinedBlocker;
pub use lsh::LshBlocker;
pub use sorted_neighborhood::SortedNeighborhoodBlocker;
pub use standard::StandardBlocker;

use std::collections::BTreeSet;

use mdm_core::config::BlockingConfig;
use mdm_core::error::{MdmError, MdmResult};
use mdm_core::types::{CandidatePair, NormalizedRecord};

/// A blocking strategy produces candidate pairs from a record set. Pure
/// with respect to its inputs: the same records and config always produce
/// the same pair set, satisfying the determinism property.
pub trait BlockingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate_pairs(&self, records: &[NormalizedRecord]) -> MdmResult<BTreeSet<CandidatePair>>;
}

/// Builds the configured strategy, or a composite of every strategy listed
/// under `strategy: "combined:standard,sorted_neighborhood"` — each
/// sub-strategy runs over the same `keys`/`window_size`/`max_block_size`
/// and their candidate pairs are unioned.
pub fn build_strategy(config: &BlockingConfig) -> MdmResult<Box<dyn BlockingStrategy>> {
    build_named_strategy(&config.strategy, config)
}

fn build_named_strategy(name: &str, config: &BlockingConfig) -> MdmResult<Box<dyn BlockingStrategy>> {
    match name {
        "standard" => Ok(Box::new(StandardBlocker::new(config.keys.clone(), config.max_block_size))),
        "sorted_neighborhood" => Ok(Box::new(SortedNeighborhoodBlocker::new(
            config.keys.clone(),
            config.window_size,
        ))),
        "lsh" => Ok(Box::new(LshBlocker::new(config.keys.clone(), config.window_size))),
        other => {
            if let Some(members) = other.strip_prefix("combined:") {
                let names: Vec<&str> = members.split(',').map(str::trim).collect();
                if names.is_empty() || names.iter().any(|n| n.is_empty()) {
                    return Err(MdmError::Config(format!(
                        "malformed combined blocking strategy '{other}', expected \
                         'combined:strategy1,strategy2'"
                    )));
                }
                let sub_strategies = names
                    .into_iter()
                    .map(|n| build_named_strategy(n, config))
                    .collect::<MdmResult<Vec<_>>>()?;
                return Ok(Box::new(CombinedBlocker::new(sub_strategies)));
            }
            Err(MdmError::Config(format!(
                "unknown blocking strategy '{other}', expected one of \
                 standard|sorted_neighborhood|lsh|combined:a,b"
            )))
        }
    }
}

/// Guards against a blocking configuration whose estimated fan-out would
/// make pair evaluation infeasible. `estimated_block_size` is the largest
/// bucket size observed while building the index; `max_block_size` is the
/// configured safety bound.
pub fn check_block_explosion(estimated_block_size: usize, max_block_size: usize) -> MdmResult<()> {
    if estimated_block_size > max_block_size {
        return Err(MdmError::Blocking(format!(
            "BLOCK_EXPLOSION: block size {estimated_block_size} exceeds configured max_block_size {max_block_size}; refine blocking keys or increase max_block_size"
        )));
    }
    Ok(())
}
