//! Encode policy selection
//!
//! Decides per job whether the audio stream can be copied as-is or has to be
//! re-encoded, and at which bitrate. Sources are never upsampled.

use crate::manifest::ConversionJob;
use std::path::Path;

/// Container and codec of every output file
pub const TARGET_EXTENSION: &str = "mp3";

/// How a single job is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePolicy {
    /// Re-containerize the audio stream without re-encoding
    StreamCopy,
    /// Re-encode with libmp3lame at the given bitrate
    Transcode { kbps: u32 },
}

impl EncodePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodePolicy::StreamCopy => "copy",
            EncodePolicy::Transcode { .. } => "transcode",
        }
    }
}

/// Whether the source file already uses the target container
pub fn has_target_extension(source_path: &str) -> bool {
    Path::new(source_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(TARGET_EXTENSION))
        .unwrap_or(false)
}

/// Choose the encode policy for a job
///
/// - source below target, mp3 source: stream copy
/// - source below target, other container: transcode at the source bitrate
/// - source at or above target: transcode at the target bitrate
///
/// An unknown bitrate counts as 0. A non-mp3 source with an unknown bitrate has no
/// usable bitrate of its own and is transcoded at the target.
pub fn choose_policy(job: &ConversionJob, target_kbps: u32) -> EncodePolicy {
    let source_kbps = job.effective_source_kbps();

    if f64::from(target_kbps) > source_kbps {
        if has_target_extension(&job.source_path) {
            return EncodePolicy::StreamCopy;
        }
        let kbps = source_kbps.round() as u32;
        if kbps > 0 {
            return EncodePolicy::Transcode { kbps };
        }
    }

    EncodePolicy::Transcode { kbps: target_kbps }
}
