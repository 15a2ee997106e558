//! Encoding modules for the batch transcoder

pub mod ffmpeg;
pub mod policy;

pub use ffmpeg::{
    build_ffmpeg_args, EncodeFailure, ExitOutcome, FfmpegTranscoder, TranscodeOutput,
    TranscodeRequest, Transcoder,
};
pub use policy::{choose_policy, has_target_extension, EncodePolicy, TARGET_EXTENSION};
