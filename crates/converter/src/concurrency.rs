//! Concurrency planning for batch runs
//!
//! Resolves the chunk size, i.e. how many transcoder processes run at once, from the
//! physical core count and configuration.

use crate::config::Config;
use std::num::NonZeroUsize;
use std::ops::Range;
use thiserror::Error;

/// The parallelism bound could not be determined
#[derive(Debug, Error)]
pub enum ResourceDiscoveryError {
    #[error("Configured physical core count is zero")]
    ZeroConfigured,

    #[error("Could not detect the number of physical CPU cores")]
    Undetected,
}

/// Resolve the chunk size for a run
///
/// Uses `cpu.physical_cores` when set, otherwise detects physical cores via num_cpus.
pub fn resolve_chunk_size(cfg: &Config) -> Result<NonZeroUsize, ResourceDiscoveryError> {
    match cfg.cpu.physical_cores {
        Some(cores) => {
            NonZeroUsize::new(cores as usize).ok_or(ResourceDiscoveryError::ZeroConfigured)
        }
        None => NonZeroUsize::new(num_cpus::get_physical()).ok_or(ResourceDiscoveryError::Undetected),
    }
}

/// Split `total` jobs into consecutive index ranges of at most `chunk_size`
///
/// The last range may be shorter.
pub fn chunk_ranges(total: usize, chunk_size: NonZeroUsize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.get();
    (0..total)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(total))
        .collect()
}
