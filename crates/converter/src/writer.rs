//! Result writer and run log
//!
//! Successful conversions are written to their output paths; failures are appended to
//! a run-scoped log file. Only the orchestrator calls into this module, after a chunk
//! has been joined, so the log never sees interleaved writes.

use crate::worker::{ConversionResult, Outcome};
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Timestamp format used in run log names
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Append-only log of files that were not converted
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Create an empty `LOG_<timestamp>` file under `output_root`
    ///
    /// An existing file of the same name is truncated.
    pub fn create(output_root: &Path, started_at: DateTime<Local>) -> io::Result<Self> {
        let name = format!("LOG_{}", started_at.format(LOG_TIMESTAMP_FORMAT));
        let path = output_root.join(name);
        File::create(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry: a tab, the source path, the error text, then a blank line
    pub fn append(&self, source_path: &str, error_text: &str) -> io::Result<()> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let entry = format!("\t{}\n{}\n\n", source_path, error_text);
        log.write_all(entry.as_bytes())
    }
}

/// Counts from flushing one chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub written: usize,
    pub failed: usize,
}

/// Persist a chunk of results
///
/// Output files are created or truncated. A failure to write an output file is logged
/// like an encode failure and does not stop the flush; only a failure to write the run
/// log itself is returned.
pub fn flush_results(
    run_log: &RunLog,
    results: Vec<ConversionResult>,
) -> io::Result<FlushSummary> {
    let mut summary = FlushSummary::default();

    for result in results {
        let source = &result.job.source_path;
        match result.outcome {
            Outcome::Success {
                output_path,
                encoded_bytes,
            } => match fs::write(&output_path, &encoded_bytes) {
                Ok(()) => {
                    debug!(
                        source = %source,
                        output = %output_path.display(),
                        bytes = encoded_bytes.len(),
                        "Converted"
                    );
                    summary.written += 1;
                }
                Err(e) => {
                    warn!("\"{}\" was not converted!", source);
                    let text = format!("Failed to write {}: {}", output_path.display(), e);
                    run_log.append(source, &text)?;
                    summary.failed += 1;
                }
            },
            Outcome::Failure { error } => {
                warn!("\"{}\" was not converted!", source);
                run_log.append(source, &error.error_text())?;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
