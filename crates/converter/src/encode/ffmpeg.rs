//! FFmpeg transcoder
//!
//! Builds the ffmpeg invocation for a job and runs it as a short-lived child process.
//! The encoded MP3 stream is read from stdout and the error text from stderr. Nothing
//! is written to disk by the child.

use super::policy::EncodePolicy;
use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Per-job encode failure. Recorded in the run log; never aborts the batch.
#[derive(Debug, Error)]
pub enum EncodeFailure {
    /// Transcoder exited with non-zero status
    #[error("Transcoder failed with exit code {code}")]
    Failed { code: i32, stderr: String },

    /// Transcoder was terminated by a signal
    #[error("Transcoder was terminated by signal")]
    Terminated { stderr: String },

    /// Transcoder exited cleanly but produced no audio
    #[error("Transcoder produced no output")]
    EmptyOutput { stderr: String },

    /// Transcoder did not finish in time and was killed
    #[error("Transcoder timed out after {timeout_secs} seconds")]
    TimedOut { timeout_secs: u64 },

    /// Transcoder could not be started
    #[error("Failed to start transcoder: {0}")]
    Spawn(#[from] std::io::Error),

    /// Target name would place the output outside its directory
    #[error("Target name \"{0}\" is not a plain file name")]
    InvalidTargetName(String),

    /// Worker task panicked before reporting
    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}

impl EncodeFailure {
    /// Text written to the run log for this failure
    ///
    /// Prefers the transcoder's own stderr and falls back to the error description.
    pub fn error_text(&self) -> String {
        let stderr = match self {
            EncodeFailure::Failed { stderr, .. }
            | EncodeFailure::Terminated { stderr }
            | EncodeFailure::EmptyOutput { stderr } => stderr.trim_end(),
            _ => "",
        };

        if stderr.is_empty() {
            self.to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Everything the transcoder needs to encode one file
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub source_path: String,
    pub policy: EncodePolicy,
    pub title: String,
    pub artist: String,
}

/// How the transcoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Code(i32),
    Signal,
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            match status.code() {
                Some(code) => ExitOutcome::Code(code),
                None => ExitOutcome::Signal,
            }
        }
    }
}

/// Captured result of one transcoder run
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOutput {
    pub exit: ExitOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl TranscodeOutput {
    /// Classify the run: the encoded bytes, or the failure with its error text
    pub fn into_result(self) -> Result<Vec<u8>, EncodeFailure> {
        let stderr = String::from_utf8_lossy(&self.stderr).into_owned();
        match self.exit {
            ExitOutcome::Success if self.stdout.is_empty() => {
                Err(EncodeFailure::EmptyOutput { stderr })
            }
            ExitOutcome::Success => Ok(self.stdout),
            ExitOutcome::Code(code) => Err(EncodeFailure::Failed { code, stderr }),
            ExitOutcome::Signal => Err(EncodeFailure::Terminated { stderr }),
        }
    }
}

/// Runs the external transcoder for a single request
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Encode one file, capturing stdout and stderr
    ///
    /// Dropping the returned future must stop any child process it started.
    async fn transcode(&self, request: &TranscodeRequest) -> std::io::Result<TranscodeOutput>;
}

/// Build the ffmpeg argument vector for a request
///
/// All non-audio streams and existing metadata are dropped, then the new Artist and
/// Title tags are stamped. The MP3 stream goes to stdout.
pub fn build_ffmpeg_args(request: &TranscodeRequest, log_level: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        log_level.into(),
        "-i".into(),
        request.source_path.clone(),
        "-vn".into(),
        "-sn".into(),
        "-dn".into(),
        "-map".into(),
        "a".into(),
    ];

    match request.policy {
        EncodePolicy::StreamCopy => {
            args.extend(["-codec:a".to_string(), "copy".to_string()]);
        }
        EncodePolicy::Transcode { kbps } => {
            args.extend([
                "-codec:a".to_string(),
                "libmp3lame".to_string(),
                "-b:a".to_string(),
                format!("{}k", kbps),
            ]);
        }
    }

    args.extend([
        "-map_metadata".to_string(),
        "-1".to_string(),
        "-metadata".to_string(),
        format!("Artist={}", request.artist),
        "-metadata".to_string(),
        format!("Title={}", request.title),
        "-f".to_string(),
        "mp3".to_string(),
        "pipe:1".to_string(),
    ]);

    args
}

/// Production transcoder backed by an ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    log_level: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            log_level: log_level.into(),
        }
    }

    /// Build the child process command for a request
    pub fn build_command(&self, request: &TranscodeRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(build_ffmpeg_args(request, &self.log_level))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        &self.program
    }

    async fn transcode(&self, request: &TranscodeRequest) -> std::io::Result<TranscodeOutput> {
        let output = self.build_command(request).output().await?;
        Ok(TranscodeOutput {
            exit: output.status.into(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
