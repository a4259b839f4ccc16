//! CLI entry point for the ripper tool.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use ripper_core::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use ripper_core::{
    HttpClient, RipConfig, RipError, StatusMessage, Transport, build_default_registry,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

mod cli;
mod config;
mod progress;

use cli::Args;

/// Outcome of one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RipOutcome {
    Completed,
    Errored,
    Skipped,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let (args, sources) = config::parse_cli_with_sources();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = config::load_default_file_config()?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        debug!(path = %path.display(), "loaded config file");
    }
    let rip_config = config::resolve_rip_config(&args, &sources, loaded.config.as_ref());

    let transport: Arc<dyn Transport> = Arc::new(
        HttpClient::with_settings(
            &rip_config.user_agent,
            CONNECT_TIMEOUT_SECS,
            READ_TIMEOUT_SECS,
        )
        .context("failed to build HTTP client")?,
    );

    let mut failures = 0usize;
    for raw_url in &args.urls {
        match rip_one(raw_url, &args, &rip_config, Arc::clone(&transport)).await? {
            RipOutcome::Completed => {}
            RipOutcome::Errored | RipOutcome::Skipped => failures += 1,
        }
        if interrupted() {
            warn!("interrupted, skipping remaining URLs");
            break;
        }
    }

    if failures > 0 {
        warn!(failures, total = args.urls.len(), "some URLs were not ripped");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Set by the Ctrl-C watcher; later URLs are skipped.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

async fn rip_one(
    raw_url: &str,
    args: &Args,
    rip_config: &RipConfig,
    transport: Arc<dyn Transport>,
) -> Result<RipOutcome> {
    let url = match Url::parse(raw_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = raw_url, error = %e, "invalid URL");
            return Ok(RipOutcome::Skipped);
        }
    };

    let registry = build_default_registry();
    let mut ripper = match registry.ripper_for(&url, rip_config, transport) {
        Ok(ripper) => ripper,
        Err(e @ RipError::Pool(_)) => return Err(e.into()),
        Err(e) => {
            error!(error = %e, "cannot rip URL");
            return Ok(RipOutcome::Skipped);
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    ripper.set_listener(Arc::new(tx));
    let printer = tokio::spawn(print_events(rx, args.json));

    let stop = ripper.stop_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight downloads");
            INTERRUPTED.store(true, Ordering::SeqCst);
            stop.stop();
        }
    });

    let label = ripper.working_dir().display().to_string();
    let (spinner, spinner_stop) =
        progress::spawn_progress_ui(!args.json && !args.quiet, ripper.progress(), label);

    info!(url = %ripper.url(), dir = %ripper.working_dir().display(), "ripping");
    ripper.run().await;

    spinner_stop.store(true, Ordering::SeqCst);
    if let Some(spinner) = spinner {
        let _ = spinner.await;
    }
    watcher.abort();
    info!(status = %ripper.status_text(), "finished");

    // The listener lives in the ripper; dropping it closes the event stream.
    drop(ripper);
    let errored = printer.await.context("status printer task failed")?;
    Ok(if errored {
        RipOutcome::Errored
    } else {
        RipOutcome::Completed
    })
}

/// Prints events until the channel closes. Returns true if the rip errored.
async fn print_events(mut rx: mpsc::UnboundedReceiver<StatusMessage>, json: bool) -> bool {
    let mut errored = false;
    while let Some(message) = rx.recv().await {
        if matches!(message, StatusMessage::RipErrored { .. }) {
            errored = true;
        }
        if json {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize status event"),
            }
        } else {
            println!("{message}");
        }
    }
    errored
}
