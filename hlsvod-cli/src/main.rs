use std::sync::Arc;

use clap::Parser;
use error::AppError;
use hlsvod_engine::{ErrorKind, JobOutcome, JobResult, VodDownloader};
use indicatif::MultiProgress;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;
mod error;
mod utils;

use cli::CliArgs;
use config::FileConfig;
use utils::progress::{ProgressManager, SuspendingStdout};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging; RUST_LOG overrides the level flags
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("hlsvod.log")?;

    // Log lines go above the progress bars instead of through them
    let multi = MultiProgress::new();
    let multi_writer = MakeWriterExt::and(SuspendingStdout::new(multi.clone()), log_file);

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("hlsvod {} - HLS VOD downloader", env!("CARGO_PKG_VERSION"));

    let file_config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };

    validate_url(&args.url)?;

    let output_path = utils::resolve_output_path(
        args.output.as_deref(),
        args.output_dir.as_deref().or(file_config.output_dir.as_deref()),
        args.name.as_deref(),
        &args.url,
    )?;

    let vod_config = config::build_vod_config(&args, &file_config)?;
    info!(
        concurrency = vod_config.scheduler.download_concurrency,
        retries = vod_config.scheduler.max_segment_retries,
        segment_timeout = ?vod_config.scheduler.segment_timeout,
        "Download configuration"
    );

    let downloader = VodDownloader::new(vod_config)?;

    // Create a progress manager based on show_progress flag
    let progress_manager = if args.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };

    info!(url = %args.url, output = %output_path.display(), "Starting download");
    let handle = downloader.spawn(
        &args.url,
        output_path,
        Some(Arc::new(move |event| {
            progress_manager.handle_event(event);
        })),
    );

    // Ctrl-C cancels the job; the engine still cleans up before returning
    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling download");
            token.cancel();
        }
    });

    report(handle.wait().await)
}

fn validate_url(input: &str) -> Result<(), AppError> {
    let url = url::Url::parse(input)
        .map_err(|e| AppError::InvalidInput(format!("'{input}' is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AppError::InvalidInput(format!(
            "unsupported URL scheme '{other}', expected http or https"
        ))),
    }
}

fn report(result: JobResult) -> Result<(), AppError> {
    if let Some(warning) = &result.cleanup_warning {
        warn!("{warning}");
    }

    let output = result
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    match result.outcome {
        JobOutcome::Succeeded => {
            info!(
                segments = result.total_segments,
                "Download complete: {output}"
            );
            Ok(())
        }
        JobOutcome::PartiallySucceeded => {
            warn!(
                "{} of {} segments failed and were skipped; output saved to {output}",
                result.failed_segments, result.total_segments
            );
            Ok(())
        }
        JobOutcome::Failed => Err(AppError::Job {
            kind: result.error_kind.unwrap_or(ErrorKind::Internal),
            message: result.message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn result(outcome: JobOutcome) -> JobResult {
        JobResult {
            job_id: Default::default(),
            success: outcome != JobOutcome::Failed,
            outcome,
            total_segments: 3,
            failed_segments: 1,
            error_kind: None,
            message: String::new(),
            output_path: Some(PathBuf::from("out.mp4")),
            cleanup_warning: None,
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://host/a.m3u8").is_ok());
        assert!(matches!(
            validate_url("ftp://host/a.m3u8"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(validate_url("index.m3u8").is_err());
    }

    #[test]
    fn test_partial_success_exits_cleanly() {
        assert!(report(result(JobOutcome::PartiallySucceeded)).is_ok());
        assert!(report(result(JobOutcome::Succeeded)).is_ok());
    }

    #[test]
    fn test_failure_carries_kind_and_message() {
        let mut failed = result(JobOutcome::Failed);
        failed.error_kind = Some(ErrorKind::ToolNotFound);
        failed.message = "ffmpeg was not found".to_string();

        let err = report(failed).unwrap_err();
        assert_eq!(err.to_string(), "tool_not_found: ffmpeg was not found");
    }
}
