//! Startup checks for the batch transcoder
//!
//! Verifies that the configured transcoder can be executed before any run-scoped
//! state (output tree, run log) is created.

use crate::config::Config;
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Transcoder not available: {0}")]
    TranscoderUnavailable(String),
}

/// Parse FFmpeg version output and extract the major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 6.1.1 ..."
/// - N-prefixed: "ffmpeg version n7.0-... ..."
///
/// Returns None for git snapshot builds ("N-113000-g...") and unparseable output.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.strip_prefix('n').unwrap_or(&version_part);

    version_str
        .split(|c| c == '.' || c == '-')
        .next()?
        .parse()
        .ok()
}

/// Check that the transcoder runs, by invoking `<program> -version`
///
/// Returns the major version when it can be parsed from the output.
pub fn check_transcoder_available(program: &str) -> Result<Option<u32>, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::TranscoderUnavailable(format!(
                "\"{} -version\" failed; is it installed and in PATH? Error: {}",
                program, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::TranscoderUnavailable(format!(
            "\"{} -version\" exited with {}",
            program, output.status
        )));
    }

    Ok(parse_ffmpeg_version(&String::from_utf8_lossy(&output.stdout)))
}

/// Run all startup checks
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    let program = &cfg.transcoder.program;
    match check_transcoder_available(program)? {
        Some(major) => info!("Using {} (major version {})", program, major),
        None => info!("Using {} (version not recognised)", program),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_standard_version() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc 13";
        assert_eq!(parse_ffmpeg_version(out), Some(6));
    }

    #[test]
    fn test_parse_n_prefixed_version() {
        assert_eq!(parse_ffmpeg_version("ffmpeg version n7.0-12-gabcdef"), Some(7));
    }

    #[test]
    fn test_parse_snapshot_and_garbage() {
        assert_eq!(parse_ffmpeg_version("ffmpeg version N-113000-g1234"), None);
        assert_eq!(parse_ffmpeg_version("not ffmpeg at all"), None);
        assert_eq!(parse_ffmpeg_version(""), None);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let result = check_transcoder_available("definitely-not-a-transcoder-binary");
        assert!(matches!(result, Err(StartupError::TranscoderUnavailable(_))));
    }

    // `false` runs but exits non-zero
    #[cfg(unix)]
    #[test]
    fn test_failing_program_is_unavailable() {
        let result = check_transcoder_available("false");
        assert!(matches!(result, Err(StartupError::TranscoderUnavailable(_))));
    }

    // `echo -version` succeeds without printing a version line
    #[cfg(unix)]
    #[test]
    fn test_program_without_version_line_is_accepted() {
        assert_eq!(check_transcoder_available("echo").unwrap(), None);
    }

    // Any "major.minor[.patch]" version, with or without the `n` prefix, parses back
    // to its major number.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_version_roundtrip(
            major in 0u32..100,
            minor in 0u32..100,
            prefixed in proptest::bool::ANY,
            suffix in "[a-z0-9]{0,8}",
        ) {
            let output = format!(
                "ffmpeg version {}{}.{}-{} Copyright (c) the FFmpeg developers\n",
                if prefixed { "n" } else { "" },
                major,
                minor,
                suffix
            );
            prop_assert_eq!(parse_ffmpeg_version(&output), Some(major));
        }
    }
}
