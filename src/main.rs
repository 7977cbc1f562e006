//! CLI entry point for the rangeget downloader.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rangeget_core::DownloadEngine;
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod reporter;

use cli::Args;
use reporter::{ProgressReporter, RunSummary};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = app_config::load_default_file_config()?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info
    let default_level = app_config::resolve_default_log_level(&args, &file_config);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, ?file_config, "configuration loaded");

    let urls = if args.urls.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        parse_url_lines(&buffer)
    } else {
        args.urls.clone()
    };
    if urls.is_empty() {
        info!("No input provided. Pass URLs as arguments or pipe them via stdin.");
        info!("Example: echo 'https://example.com/file.zip' | rangeget");
        return Ok(ExitCode::SUCCESS);
    }

    let config = app_config::build_engine_config(&args, &file_config);
    let engine = DownloadEngine::new(config)?;

    let show_bars = !args.quiet && io::stderr().is_terminal();
    let (reporter, mut outcomes) = ProgressReporter::new(show_bars);
    engine.set_global_listener(Arc::new(reporter));

    let mut summary = RunSummary::default();
    let mut started = 0usize;
    for url in &urls {
        match engine.start_download(url, None, args.target_dir.as_deref(), None) {
            Ok(task_id) => {
                debug!(%task_id, url = %url, "download queued");
                started += 1;
            }
            Err(e) => {
                error!(url = %url, error = %e, "download rejected");
                summary.reject(url, e.to_string());
            }
        }
    }

    let interrupt_engine = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted. Partial files are kept; run again to resume.");
            interrupt_engine.cancel_all();
        }
    });

    while summary.finished() < started {
        let Some((task_id, outcome)) = outcomes.recv().await else {
            break;
        };
        summary.record(task_id, outcome);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for path in &summary.completed {
            println!("{}", path.display());
        }
    }
    for failed in &summary.failed {
        error!(task_id = %failed.task_id, "{}", failed.error);
    }
    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        cancelled = summary.cancelled,
        rejected = summary.rejected.len(),
        "Download run finished"
    );

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// One URL per line; blank lines and `#` comments are skipped.
fn parse_url_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
