//! Conversion worker
//!
//! Converts a single job: picks the encode policy, runs the transcoder under an
//! optional time limit and packages the outcome. The worker touches no shared state;
//! its result is handed back to the orchestrator by value.

use crate::encode::{
    choose_policy, EncodeFailure, EncodePolicy, TranscodeRequest, Transcoder, TARGET_EXTENSION,
};
use crate::manifest::{is_plain_component, ConversionJob};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// What happened to one job
#[derive(Debug)]
pub enum Outcome {
    /// Encoded bytes, still to be written to `output_path`
    Success {
        output_path: PathBuf,
        encoded_bytes: Vec<u8>,
    },
    /// Nothing is written; the error text goes to the run log
    Failure { error: EncodeFailure },
}

/// Result of converting one job
#[derive(Debug)]
pub struct ConversionResult {
    pub job: ConversionJob,
    pub outcome: Outcome,
}

impl ConversionResult {
    pub fn failure(job: ConversionJob, error: EncodeFailure) -> Self {
        Self {
            job,
            outcome: Outcome::Failure { error },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }
}

/// Output file for a job: `<output_dir>/<target_base_name>.mp3`, whatever the policy
///
/// The target name must be a plain file name; separators, `.`, `..` and absolute
/// names are refused so the file always lands directly in `output_dir`.
pub fn output_path_for(output_dir: &Path, job: &ConversionJob) -> Result<PathBuf, EncodeFailure> {
    let file_name = format!("{}.{}", job.target_base_name, TARGET_EXTENSION);
    if !is_plain_component(&job.target_base_name) || !is_plain_component(&file_name) {
        return Err(EncodeFailure::InvalidTargetName(
            job.target_base_name.clone(),
        ));
    }
    Ok(output_dir.join(file_name))
}

/// Convert one job
///
/// Never returns an error: every failure is folded into [`Outcome::Failure`] so that a
/// bad file cannot take its siblings down. When `timeout` elapses the in-flight
/// transcode future is dropped, which kills the child process.
pub async fn convert(
    transcoder: &dyn Transcoder,
    job: ConversionJob,
    output_dir: &Path,
    target_kbps: u32,
    timeout: Option<Duration>,
) -> ConversionResult {
    let output_path = match output_path_for(output_dir, &job) {
        Ok(path) => path,
        Err(error) => return ConversionResult::failure(job, error),
    };

    let policy = choose_policy(&job, target_kbps);
    let request = TranscodeRequest {
        source_path: job.source_path.clone(),
        policy,
        title: job.target_title.clone(),
        artist: job.target_artist.clone(),
    };

    let kbps = match policy {
        EncodePolicy::Transcode { kbps } => Some(kbps),
        EncodePolicy::StreamCopy => None,
    };
    debug!(
        source = %job.source_path,
        policy = policy.as_str(),
        kbps = ?kbps,
        transcoder = transcoder.name(),
        "Converting"
    );

    let run = transcoder.transcode(&request);
    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(output) => output,
            Err(_) => {
                return ConversionResult::failure(
                    job,
                    EncodeFailure::TimedOut {
                        timeout_secs: limit.as_secs(),
                    },
                )
            }
        },
        None => run.await,
    };

    let outcome = match output.map_err(EncodeFailure::from).and_then(|o| o.into_result()) {
        Ok(encoded_bytes) => Outcome::Success {
            output_path,
            encoded_bytes,
        },
        Err(error) => Outcome::Failure { error },
    };

    ConversionResult { job, outcome }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory transcoders shared by the worker and batch tests

    use crate::encode::{
        EncodePolicy, ExitOutcome, TranscodeOutput, TranscodeRequest, Transcoder,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the policy back as the "encoded" bytes; fails sources containing "bad"
    /// with empty output, and stalls on sources containing "hang".
    #[derive(Default)]
    pub struct ScriptedTranscoder {
        pub delay: Option<Duration>,
        pub requests: Mutex<Vec<TranscodeRequest>>,
        pub running: AtomicUsize,
        pub max_running: AtomicUsize,
    }

    impl ScriptedTranscoder {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn seen_sources(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.source_path.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transcoder for ScriptedTranscoder {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn transcode(
            &self,
            request: &TranscodeRequest,
        ) -> std::io::Result<TranscodeOutput> {
            self.requests.lock().unwrap().push(request.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            if request.source_path.contains("hang") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if request.source_path.contains("bad") {
                return Ok(TranscodeOutput {
                    exit: ExitOutcome::Success,
                    stdout: Vec::new(),
                    stderr: format!("{}: Invalid data found when processing input\n", request.source_path)
                        .into_bytes(),
                });
            }

            let body = match request.policy {
                EncodePolicy::StreamCopy => "copy".to_string(),
                EncodePolicy::Transcode { kbps } => format!("transcode {}", kbps),
            };
            Ok(TranscodeOutput {
                exit: ExitOutcome::Success,
                stdout: body.into_bytes(),
                stderr: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedTranscoder;
    use super::*;

    fn job(source_path: &str, kbps: Option<f64>) -> ConversionJob {
        ConversionJob {
            source_path: source_path.to_string(),
            source_base_name: Path::new(source_path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            source_bitrate_kbps: kbps,
            target_base_name: "Renamed".to_string(),
            target_title: "Title".to_string(),
            target_artist: "Artist".to_string(),
        }
    }

    #[test]
    fn test_output_path_always_mp3() {
        let path = output_path_for(Path::new("/out/music/A"), &job("/srv/music/A/x.flac", None))
            .unwrap();
        assert_eq!(path, PathBuf::from("/out/music/A/Renamed.mp3"));
    }

    #[test]
    fn test_target_name_cannot_leave_output_dir() {
        for name in ["/srv/music/A/a", "../../../srv/music/A/a", "sub/a", "..", ".", ""] {
            let mut unsafe_job = job("/srv/music/A/a.mp3", Some(96.0));
            unsafe_job.target_base_name = name.to_string();
            let result = output_path_for(Path::new("/out/music/A"), &unsafe_job);
            assert!(
                matches!(result, Err(EncodeFailure::InvalidTargetName(_))),
                "target {:?} gave {:?}",
                name,
                result
            );
        }
    }

    #[tokio::test]
    async fn test_unsafe_target_name_fails_without_transcoding() {
        let transcoder = ScriptedTranscoder::default();
        let mut unsafe_job = job("/srv/music/A/a.mp3", Some(96.0));
        unsafe_job.target_base_name = "/srv/music/A/a".to_string();

        let result = convert(&transcoder, unsafe_job, Path::new("/out/music/A"), 128, None).await;

        match result.outcome {
            Outcome::Failure {
                error: EncodeFailure::InvalidTargetName(name),
            } => assert_eq!(name, "/srv/music/A/a"),
            other => panic!("expected invalid target name, got {:?}", other),
        }
        assert!(transcoder.seen_sources().is_empty());
    }

    #[tokio::test]
    async fn test_convert_success_carries_output_path_and_bytes() {
        let transcoder = ScriptedTranscoder::default();
        let result = convert(
            &transcoder,
            job("/srv/music/A/x.flac", Some(320.0)),
            Path::new("/out/music/A"),
            128,
            None,
        )
        .await;

        match result.outcome {
            Outcome::Success {
                output_path,
                encoded_bytes,
            } => {
                assert_eq!(output_path, PathBuf::from("/out/music/A/Renamed.mp3"));
                assert_eq!(encoded_bytes, b"transcode 128".to_vec());
            }
            other => panic!("expected success, got {:?}", other),
        }

        let requests = transcoder.requests.lock().unwrap();
        assert_eq!(requests[0].title, "Title");
        assert_eq!(requests[0].artist, "Artist");
    }

    #[tokio::test]
    async fn test_convert_stream_copy_for_small_mp3() {
        let transcoder = ScriptedTranscoder::default();
        let result = convert(
            &transcoder,
            job("/srv/music/A/x.mp3", Some(96.0)),
            Path::new("/out"),
            128,
            None,
        )
        .await;

        match result.outcome {
            Outcome::Success { encoded_bytes, .. } => assert_eq!(encoded_bytes, b"copy".to_vec()),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_failure_with_stderr() {
        let transcoder = ScriptedTranscoder::default();
        let result = convert(
            &transcoder,
            job("/srv/music/bad.flac", Some(320.0)),
            Path::new("/out"),
            128,
            None,
        )
        .await;

        assert!(!result.is_success());
        match result.outcome {
            Outcome::Failure { error } => {
                assert!(matches!(error, EncodeFailure::EmptyOutput { .. }));
                assert!(error.error_text().contains("Invalid data found"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_transcoder_times_out() {
        let transcoder = ScriptedTranscoder::default();
        let result = convert(
            &transcoder,
            job("/srv/music/hang.flac", Some(320.0)),
            Path::new("/out"),
            128,
            Some(Duration::from_secs(30)),
        )
        .await;

        match result.outcome {
            Outcome::Failure {
                error: EncodeFailure::TimedOut { timeout_secs },
            } => assert_eq!(timeout_secs, 30),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(result.job.source_path, "/srv/music/hang.flac");
    }

    #[tokio::test]
    async fn test_spawn_error_is_failure() {
        let transcoder =
            crate::encode::FfmpegTranscoder::new("definitely-not-a-transcoder-binary", "error");
        let result = convert(
            &transcoder,
            job("/srv/music/x.flac", Some(320.0)),
            Path::new("/out"),
            128,
            None,
        )
        .await;

        match result.outcome {
            Outcome::Failure {
                error: EncodeFailure::Spawn(_),
            } => {}
            other => panic!("expected spawn failure, got {:?}", other),
        }
    }
}
