//! Per-album rip lifecycle.
//!
//! A [`Ripper`] binds one [`AlbumHandler`] to one URL and drives it through
//! `Created → Running → {Completed, Errored}`:
//!
//! 1. Construction validates and sanitizes the URL, derives the working
//!    directory, and allocates a [`DownloadPool`]. Nothing touches the disk.
//! 2. [`Ripper::run`] creates the working directory and calls the handler,
//!    which submits files through a [`RipSession`].
//! 3. When extraction returns, the pool is drained and exactly one terminal
//!    event is sent: `RIP_COMPLETE` or `RIP_ERRORED`.
//! 4. An empty working directory is removed.
//!
//! Stopping is cooperative. [`StopHandle::stop`] sets a flag that the next
//! stop check observes; in-flight transfers are never cut off.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ripper_core::download::HttpClient;
//! use ripper_core::registry::build_default_registry;
//! use ripper_core::ripper::RipConfig;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = build_default_registry();
//! let url = Url::parse("https://example.com/gallery/cats")?;
//! let mut ripper = registry.ripper_for(&url, &RipConfig::default(), Arc::new(HttpClient::new()))?;
//! ripper.run().await;
//! println!("{}", ripper.status_text());
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod session;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::download::filename::sanitize_path_component;
use crate::download::{
    BROWSER_USER_AGENT, DEFAULT_CONCURRENCY, DownloadPool, PoolConfig, PoolState, RetryPolicy,
    Transport,
};
use crate::status::{StatusChannel, StatusListener, StatusMessage};

pub use error::RipError;
pub use handler::AlbumHandler;
pub use session::RipSession;

/// Default root for working directories.
pub const DEFAULT_OUTPUT_DIR: &str = "rips";

/// Shared, monotonic stop flag.
///
/// Cloning yields another handle to the same flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Idempotent and non-blocking.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once any handle has called [`StopHandle::stop`].
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle state of a rip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RipState {
    /// Constructed, not yet run.
    Created = 0,
    /// `run` is in progress.
    Running = 1,
    /// Finished; every download drained.
    Completed = 2,
    /// Aborted by a fatal error or a stop.
    Errored = 3,
}

impl RipState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Errored,
        }
    }

    /// Returns the display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Errored => "Errored",
        }
    }

    /// Returns true for `Completed` and `Errored`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

impl fmt::Display for RipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by every rip.
#[derive(Debug, Clone)]
pub struct RipConfig {
    /// Root under which each album's working directory is created.
    pub output_dir: PathBuf,
    /// Maximum simultaneous downloads (1-100).
    pub concurrency: usize,
    /// Retry policy for each file.
    pub retry_policy: RetryPolicy,
    /// Replace files that already exist.
    pub overwrite: bool,
    /// User-Agent for HTTP requests.
    pub user_agent: String,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            overwrite: false,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl RipConfig {
    /// Pool settings derived from this config.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.concurrency,
            retry_policy: self.retry_policy.clone(),
            overwrite: self.overwrite,
        }
    }
}

/// Read-only progress view, usable from other tasks while `run` executes.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    state: Arc<AtomicU8>,
    pool: Arc<PoolState>,
}

impl ProgressHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RipState {
        RipState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Download counters.
    #[must_use]
    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    /// Finished files as a percentage of submitted files.
    ///
    /// 100 once the rip completed, 0 while nothing has been submitted.
    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        if self.state() == RipState::Completed {
            return 100;
        }
        let submitted = self.pool.submitted();
        if submitted == 0 {
            return 0;
        }
        let percent = (self.pool.finished() * 100 / submitted).min(100);
        u8::try_from(percent).unwrap_or(100)
    }

    /// One-line status, e.g. `Running: 3/10 files (1 errored, 0 skipped)`.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self.state() {
            RipState::Created => RipState::Created.to_string(),
            state => format!("{state}: {}", self.pool.status_line()),
        }
    }
}

/// Drives one album rip.
pub struct Ripper {
    handler: Box<dyn AlbumHandler>,
    url: Url,
    working_dir: PathBuf,
    pool: DownloadPool,
    status: StatusChannel,
    stop: StopHandle,
    state: Arc<AtomicU8>,
    completed: bool,
}

impl Ripper {
    /// Binds `handler` to `url`.
    ///
    /// Side-effect free: the working directory is only computed here.
    ///
    /// # Errors
    ///
    /// - [`RipError::UnsupportedUrl`] if the handler rejects the URL
    /// - [`RipError::Pool`] if `config.concurrency` is out of range
    pub fn new(
        handler: Box<dyn AlbumHandler>,
        url: Url,
        config: &RipConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RipError> {
        if !handler.can_rip(&url) {
            return Err(RipError::unsupported(
                url.as_str(),
                format!("{} cannot rip this URL", handler.host()),
            ));
        }
        let url = handler.sanitize_url(url)?;
        let title = handler.album_title(&url)?;
        let working_dir = config.output_dir.join(sanitize_path_component(&title));

        let stop = StopHandle::new();
        let status = StatusChannel::new();
        let pool = DownloadPool::new(config.pool_config(), transport, status.clone(), stop.clone())?;

        debug!(
            host = handler.host(),
            %url,
            dir = %working_dir.display(),
            "ripper created"
        );

        Ok(Self {
            handler,
            url,
            working_dir,
            pool,
            status,
            stop,
            state: Arc::new(AtomicU8::new(RipState::Created as u8)),
            completed: false,
        })
    }

    /// Attaches the single status listener. Call before [`Ripper::run`].
    pub fn set_listener(&mut self, listener: Arc<dyn StatusListener>) {
        self.set_status_channel(StatusChannel::with_listener(listener));
    }

    /// Replaces the status channel. Call before [`Ripper::run`].
    pub fn set_status_channel(&mut self, status: StatusChannel) {
        self.pool.set_status_channel(status.clone());
        self.status = status;
    }

    /// Host identifier of the bound handler.
    #[must_use]
    pub fn host(&self) -> &str {
        self.handler.host()
    }

    /// The sanitized album URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Where this album's files go.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RipState {
        RipState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Requests a cooperative stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// True once any stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// A handle that can stop this rip from another task.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// A handle for polling progress from another task.
    #[must_use]
    pub fn progress(&self) -> ProgressHandle {
        ProgressHandle {
            state: Arc::clone(&self.state),
            pool: Arc::clone(self.pool.state()),
        }
    }

    /// Finished downloads as a share of submitted ones, 0 to 100.
    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        self.progress().completion_percentage()
    }

    /// State name plus file counts, e.g. `Running: 3/10 files (0 errored, 1 skipped)`.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.progress().status_text()
    }

    /// Runs the rip to a terminal state.
    ///
    /// Never fails: outcomes are reported as status events. A second call
    /// is ignored.
    #[instrument(skip(self), fields(url = %self.url, dir = %self.working_dir.display()))]
    pub async fn run(&mut self) {
        if self.state() != RipState::Created {
            warn!(state = %self.state(), "rip already ran, ignoring");
            return;
        }
        self.set_state(RipState::Running);
        info!(host = self.handler.host(), "starting rip");

        match self.rip_album().await {
            Ok(()) => self.check_if_complete(),
            Err(e) => self.fail(&e).await,
        }

        self.cleanup().await;
    }

    async fn rip_album(&self) -> Result<(), RipError> {
        tokio::fs::create_dir_all(&self.working_dir)
            .await
            .map_err(|e| RipError::io(&self.working_dir, e))?;

        let session = RipSession::new(
            &self.url,
            &self.working_dir,
            &self.pool,
            &self.status,
            &self.stop,
        );
        self.handler.rip(&session).await?;
        session.stop_check().await?;

        self.pool.wait_for_threads().await;
        Ok(())
    }

    /// Marks the rip completed and sends `RIP_COMPLETE`, at most once.
    fn check_if_complete(&mut self) {
        if self.completed || self.state() != RipState::Running {
            return;
        }
        self.completed = true;
        self.set_state(RipState::Completed);

        let pool = self.pool.state();
        info!(
            completed = pool.completed(),
            errored = pool.errored(),
            problems = pool.problems(),
            bytes = pool.bytes(),
            "rip complete"
        );
        self.status.notify(StatusMessage::RipComplete {
            dir: self.working_dir.clone(),
        });
    }

    async fn fail(&self, e: &RipError) {
        // Terminal event waits for every submitted download.
        self.pool.wait_for_threads().await;
        self.set_state(RipState::Errored);

        if e.is_interrupted() {
            warn!("rip interrupted");
        } else {
            error!(error = %e, "rip failed");
        }
        self.status.notify(StatusMessage::RipErrored {
            reason: e.to_string(),
        });
    }

    /// Removes the working directory if the rip left it empty.
    async fn cleanup(&self) {
        match is_empty_dir(&self.working_dir).await {
            Ok(true) => match tokio::fs::remove_dir(&self.working_dir).await {
                Ok(()) => info!("removed empty working directory"),
                Err(e) => error!(error = %e, "could not remove empty working directory"),
            },
            Ok(false) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!(error = %e, "could not inspect working directory"),
        }
    }

    fn set_state(&self, state: RipState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

async fn is_empty_dir(path: &Path) -> io::Result<bool> {
    let mut entries = tokio::fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

impl fmt::Debug for Ripper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ripper")
            .field("host", &self.handler.host())
            .field("url", &self.url.as_str())
            .field("working_dir", &self.working_dir)
            .field("state", &self.state())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
