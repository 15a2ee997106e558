//! Batch orchestration
//!
//! Drives a run end to end: validate parameters, read the manifest, build the output
//! tree, then convert the jobs chunk by chunk. Each chunk is fully joined and flushed
//! before the next one is dispatched.

use crate::concurrency::{chunk_ranges, resolve_chunk_size, ResourceDiscoveryError};
use crate::config::{Config, ConfigError, RunParams};
use crate::encode::{EncodeFailure, FfmpegTranscoder, Transcoder};
use crate::manifest::{read_manifest, ConversionJob, ManifestError};
use crate::planner::{plan_output_dirs, PathMappingError};
use crate::reindex::request_rescan;
use crate::startup::{run_startup_checks, StartupError};
use crate::worker::{convert, ConversionResult};
use crate::writer::{flush_results, RunLog};
use chrono::Local;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Output tree error: {0}")]
    PathMapping(#[from] PathMappingError),

    #[error("Resource discovery error: {0}")]
    ResourceDiscovery(#[from] ResourceDiscoveryError),

    #[error("Run log error: {0}")]
    RunLog(#[from] std::io::Error),
}

/// Orchestrator state, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Chunking,
    Dispatching { chunk: usize },
    Awaiting { chunk: usize },
    Flushing { chunk: usize },
    Done,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Converted tree: `<output_root>/<root_folder_name>`
    pub root_folder: PathBuf,
    pub total_jobs: usize,
    pub chunk_size: usize,
    pub chunks: usize,
    pub converted: usize,
    pub failed: usize,
    pub log_path: PathBuf,
}

impl BatchReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Counts produced by [`BatchConverter::process_jobs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub chunks: usize,
    pub converted: usize,
    pub failed: usize,
}

/// Run-scoped batch converter
///
/// Holds everything a run needs; nothing is read from process-wide state.
pub struct BatchConverter {
    config: Config,
    transcoder: Arc<dyn Transcoder>,
}

impl BatchConverter {
    /// Create a converter using ffmpeg, after checking that it can be executed
    pub fn new(config: Config) -> Result<Self, BatchError> {
        run_startup_checks(&config)?;
        Ok(Self::new_without_checks(config))
    }

    /// Create a converter using ffmpeg without running startup checks
    pub fn new_without_checks(config: Config) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::new(
            config.transcoder.program.clone(),
            config.transcoder.log_level.clone(),
        ));
        Self::with_transcoder(config, transcoder)
    }

    /// Create a converter around any transcoder implementation
    pub fn with_transcoder(config: Config, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { config, transcoder }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Per-job time limit; None when disabled
    pub fn job_timeout(&self) -> Option<Duration> {
        match self.config.transcoder.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Execute a full run
    ///
    /// Every fatal check runs before the first conversion starts. Per-file failures
    /// are only recorded in the run log.
    pub async fn run(&self, params: &RunParams) -> Result<BatchReport, BatchError> {
        params.validate()?;
        let started_at = Local::now();

        let chunk_size = resolve_chunk_size(&self.config)?;
        let manifest = read_manifest(&params.manifest_path)?;
        let output_dirs = plan_output_dirs(&manifest.context, &params.output_root, &manifest.jobs)?;
        let run_log = RunLog::create(&params.output_root, started_at)?;

        info!(
            jobs = manifest.jobs.len(),
            chunk_size = chunk_size.get(),
            target_kbps = params.target_kbps,
            log = %run_log.path().display(),
            "Starting batch conversion"
        );

        let total_jobs = manifest.jobs.len();
        let summary = self
            .process_jobs(
                manifest.jobs,
                output_dirs,
                params.target_kbps,
                chunk_size,
                &run_log,
            )
            .await?;

        let root_folder = params.output_root.join(&manifest.context.root_folder_name);
        request_rescan(&self.config.reindex, &root_folder, &params.output_root);

        let report = BatchReport {
            root_folder,
            total_jobs,
            chunk_size: chunk_size.get(),
            chunks: summary.chunks,
            converted: summary.converted,
            failed: summary.failed,
            log_path: run_log.path().to_path_buf(),
        };
        info!(
            converted = report.converted,
            failed = report.failed,
            "Batch conversion finished"
        );
        Ok(report)
    }

    /// Convert `jobs` in consecutive chunks of `chunk_size`
    ///
    /// `output_dirs` must be aligned with `jobs` and already exist. Within a chunk one
    /// task, and so one transcoder process, runs per job. The chunk's results come back
    /// through the task handles and are flushed before the next chunk is dispatched.
    pub async fn process_jobs(
        &self,
        jobs: Vec<ConversionJob>,
        output_dirs: Vec<PathBuf>,
        target_kbps: u32,
        chunk_size: NonZeroUsize,
        run_log: &RunLog,
    ) -> Result<ProcessSummary, BatchError> {
        debug_assert_eq!(jobs.len(), output_dirs.len());

        let mut state = BatchState::Idle;
        let mut summary = ProcessSummary::default();
        let total = jobs.len();
        let timeout = self.job_timeout();

        transition(&mut state, BatchState::Chunking);
        let ranges = chunk_ranges(total, chunk_size);
        let mut pending = jobs.into_iter().zip(output_dirs);

        for (chunk, range) in ranges.into_iter().enumerate() {
            info!("Processing files {}-{} of {}.", range.start + 1, range.end, total);

            transition(&mut state, BatchState::Dispatching { chunk });
            let mut handles = Vec::with_capacity(range.len());
            for (job, output_dir) in pending.by_ref().take(range.len()) {
                let transcoder = Arc::clone(&self.transcoder);
                let fallback = job.clone();
                let handle = tokio::spawn(async move {
                    convert(transcoder.as_ref(), job, &output_dir, target_kbps, timeout).await
                });
                handles.push((fallback, handle));
            }

            transition(&mut state, BatchState::Awaiting { chunk });
            let mut results: Vec<ConversionResult> = Vec::with_capacity(handles.len());
            for (fallback, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_err) => ConversionResult::failure(
                        fallback,
                        EncodeFailure::WorkerPanicked(join_err.to_string()),
                    ),
                };
                results.push(result);
            }

            transition(&mut state, BatchState::Flushing { chunk });
            let flushed = flush_results(run_log, results)?;
            summary.chunks += 1;
            summary.converted += flushed.written;
            summary.failed += flushed.failed;
        }

        transition(&mut state, BatchState::Done);
        Ok(summary)
    }
}

fn transition(state: &mut BatchState, next: BatchState) {
    debug!(from = ?*state, to = ?next, "Batch state");
    *state = next;
}
