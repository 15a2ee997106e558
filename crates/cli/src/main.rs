//! CLI entry point for the batch transcoder
//!
//! Parses command line arguments, loads configuration and runs one batch.

use batch_transcode::{BatchConverter, Config, RunParams};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Convert the files selected in a manifest to MP3
#[derive(Parser, Debug)]
#[command(name = "batch-transcode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Manifest CSV written by the indexing pass
    #[arg(short, long)]
    manifest: PathBuf,

    /// Existing directory that receives the converted tree and the run log
    #[arg(short, long)]
    output: PathBuf,

    /// Target MP3 bitrate in kbps
    #[arg(short, long, default_value_t = 128)]
    kbps: u32,

    /// Optional configuration file (config.toml); environment overrides still apply
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the transcoder availability check. For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Print the run report as JSON
    #[arg(long, default_value = "false")]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "batch_transcode=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::from_env(),
    };

    let converter = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        BatchConverter::new_without_checks(config)
    } else {
        match BatchConverter::new(config) {
            Ok(converter) => converter,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let params = RunParams::new(args.manifest, args.output, args.kbps);
    let report = match converter.run(&params).await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!(
            "Converted {} of {} files into {} ({} failed, see {})",
            report.converted,
            report.total_jobs,
            report.root_folder.display(),
            report.failed,
            report.log_path.display()
        );
    }

    ExitCode::SUCCESS
}
