//! Hand-off to the indexing pass
//!
//! After a run the converted tree gets a fresh manifest from the external indexer.
//! The command is spawned and left running; its outcome is not tracked.

use crate::config::ReindexConfig;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{info, warn};

/// Spawn the configured indexer for `converted_root`, writing into `output_root`
///
/// Returns the child handle, or None when no indexer is configured or it could not be
/// started. A failed spawn is only logged.
pub fn request_rescan(
    cfg: &ReindexConfig,
    converted_root: &Path,
    output_root: &Path,
) -> Option<Child> {
    let Some(program) = cfg.command.as_deref() else {
        info!(
            "No indexer configured; {} was not re-scanned",
            converted_root.display()
        );
        return None;
    };

    let spawned = Command::new(program)
        .args(&cfg.args)
        .arg(converted_root)
        .arg(output_root)
        .stdin(Stdio::null())
        .spawn();

    match spawned {
        Ok(child) => {
            info!(
                pid = child.id(),
                "Requested re-scan of {} via {}",
                converted_root.display(),
                program
            );
            Some(child)
        }
        Err(e) => {
            warn!("Failed to start indexer {}: {}", program, e);
            None
        }
    }
}
