//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Resumable concurrent downloader.
///
/// Downloads every URL given as an argument (or one per line on stdin),
/// resuming any partial file left by an earlier run. Files are sorted into
/// per-type folders under the output directory.
#[derive(Parser, Debug)]
#[command(name = "rangeget")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Base output directory [default: ./Downloads]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Save into this directory instead of the per-type folder
    #[arg(short = 'd', long)]
    pub target_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100) [default: 3]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Connect timeout in seconds (1-3600) [default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Read timeout in seconds (1-3600) [default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print a JSON run summary instead of one saved path per line
    #[arg(long)]
    pub json: bool,
}
