//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use ripper_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

/// Download albums of images and media from web pages.
///
/// Each URL is matched against the built-in handlers; the first one that
/// accepts it discovers the album's files and downloads them into a folder
/// named after the album.
#[derive(Parser, Debug)]
#[command(name = "ripper")]
#[command(author, version, about)]
pub struct Args {
    /// Album page or media file URLs
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Directory under which album folders are created [default: rips]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Maximum attempts per file for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Replace files that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Print status events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
