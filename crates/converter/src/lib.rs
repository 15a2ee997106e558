//! Batch audio transcoder
//!
//! Converts the files selected in an indexing manifest to MP3, mirroring the source
//! folder layout under an output root. Files are processed in chunks sized to the
//! machine's physical cores; per-file failures go to a run log instead of stopping
//! the batch.

pub mod batch;
pub mod concurrency;
pub mod encode;
pub mod manifest;
pub mod planner;
pub mod reindex;
pub mod startup;
pub mod worker;
pub mod writer;

pub use batch_transcode_config as config;
pub use batch_transcode_config::{Config, RunParams};
pub use batch::{BatchConverter, BatchError, BatchReport, BatchState, ProcessSummary};
pub use concurrency::{chunk_ranges, resolve_chunk_size, ResourceDiscoveryError};
pub use encode::{
    build_ffmpeg_args, choose_policy, EncodeFailure, EncodePolicy, FfmpegTranscoder,
    TranscodeOutput, TranscodeRequest, Transcoder,
};
pub use manifest::{read_manifest, ConversionJob, Manifest, ManifestContext, ManifestError};
pub use planner::{output_dir_for, plan_output_dirs, PathMappingError};
pub use reindex::request_rescan;
pub use startup::{check_transcoder_available, parse_ffmpeg_version, run_startup_checks, StartupError};
pub use worker::{convert, ConversionResult, Outcome};
pub use writer::{flush_results, FlushSummary, RunLog};
