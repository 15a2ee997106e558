//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Target bitrate is zero
    InvalidBitrate(u32),
    /// Manifest path is missing or is not a regular file
    ManifestNotFile(PathBuf),
    /// Output root is missing or is not a directory
    OutputRootNotDir(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::InvalidBitrate(kbps) => {
                write!(f, "Target bitrate must be positive (\"{}\" was provided)", kbps)
            }
            ConfigError::ManifestNotFile(path) => {
                write!(f, "Manifest \"{}\" does not exist or is not a file", path.display())
            }
            ConfigError::OutputRootNotDir(path) => write!(
                f,
                "Output root \"{}\" does not exist or is not a folder",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// CPU-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CpuConfig {
    /// Number of physical cores, i.e. the chunk size (auto-detected if None)
    pub physical_cores: Option<u32>,
}

/// External transcoder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscoderConfig {
    /// Program invoked once per job (default "ffmpeg")
    #[serde(default = "default_program")]
    pub program: String,
    /// Value passed to `-loglevel`; controls how much error text is captured
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-job wall clock limit in seconds (0 = wait forever)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_timeout_secs() -> u64 {
    900
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            log_level: default_log_level(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Hand-off to the indexing pass that regenerates a manifest for the converted tree
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ReindexConfig {
    /// Command to spawn after the run; nothing is spawned when unset
    pub command: Option<String>,
    /// Leading arguments; the converted folder and output root are appended
    #[serde(default)]
    pub args: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub cpu: CpuConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - TRANSCODE_PHYSICAL_CORES -> cpu.physical_cores
    /// - TRANSCODE_PROGRAM -> transcoder.program
    /// - TRANSCODE_LOG_LEVEL -> transcoder.log_level
    /// - TRANSCODE_TIMEOUT_SECS -> transcoder.timeout_secs
    /// - TRANSCODE_REINDEX_COMMAND -> reindex.command
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TRANSCODE_PHYSICAL_CORES") {
            if let Ok(cores) = val.parse::<u32>() {
                self.cpu.physical_cores = Some(cores);
            }
        }

        if let Ok(val) = env::var("TRANSCODE_PROGRAM") {
            if !val.trim().is_empty() {
                self.transcoder.program = val;
            }
        }

        if let Ok(val) = env::var("TRANSCODE_LOG_LEVEL") {
            if !val.trim().is_empty() {
                self.transcoder.log_level = val;
            }
        }

        if let Ok(val) = env::var("TRANSCODE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.transcoder.timeout_secs = secs;
            }
        }

        // An empty value switches the hand-off off
        if let Ok(val) = env::var("TRANSCODE_REINDEX_COMMAND") {
            self.reindex.command = if val.trim().is_empty() { None } else { Some(val) };
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }
}

/// Parameters of a single batch run
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    /// Manifest produced by the indexing pass
    pub manifest_path: PathBuf,
    /// Existing directory the converted tree is written under
    pub output_root: PathBuf,
    /// Requested output bitrate in kbps
    pub target_kbps: u32,
}

impl RunParams {
    pub fn new(manifest_path: PathBuf, output_root: PathBuf, target_kbps: u32) -> Self {
        Self {
            manifest_path,
            output_root,
            target_kbps,
        }
    }

    /// Check the parameters before any work is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_kbps == 0 {
            return Err(ConfigError::InvalidBitrate(self.target_kbps));
        }
        if !self.manifest_path.is_file() {
            return Err(ConfigError::ManifestNotFile(self.manifest_path.clone()));
        }
        if !self.output_root.is_dir() {
            return Err(ConfigError::OutputRootNotDir(self.output_root.clone()));
        }
        Ok(())
    }
}
