//! Bounded download pool with a drain barrier.
//!
//! The [`DownloadPool`] runs each submitted [`DownloadTask`] in its own Tokio
//! task, using a semaphore to limit how many transfers run at once.
//!
//! # Concurrency Model
//!
//! - `submit` never waits: it spawns the task and returns
//! - Each task acquires a semaphore permit before transferring (RAII release)
//! - Tasks beyond the bound wait on the semaphore, which is FIFO-fair
//! - A pending counter (queued + in flight) is published through a
//!   `watch` channel; [`DownloadPool::wait_for_threads`] waits for it to hit zero
//!
//! # Failure Semantics
//!
//! A failed task is reported through the status channel and counted. It
//! never aborts sibling tasks or the pool.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, instrument, warn};

use super::retry::{RetryDecision, RetryPolicy};
use super::{DownloadError, DownloadTask, Transport};
use crate::ripper::StopHandle;
use crate::status::{StatusChannel, StatusMessage};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Error type for download pool construction.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Settings for a [`DownloadPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum simultaneous transfers (1-100).
    pub concurrency: usize,
    /// Retry policy applied to each transfer.
    pub retry_policy: RetryPolicy,
    /// Replace files that already exist instead of reporting a problem.
    pub overwrite: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            overwrite: false,
        }
    }
}

/// Counters describing the pool's work so far.
///
/// Updated by worker tasks only; everything else reads.
#[derive(Debug)]
pub struct PoolState {
    submitted: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    problems: AtomicUsize,
    bytes: AtomicU64,
    pending: watch::Sender<usize>,
}

impl Default for PoolState {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolState {
    /// Creates a state with zero counts.
    #[must_use]
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            submitted: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            errored: AtomicUsize::new(0),
            problems: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            pending,
        }
    }

    /// Total tasks ever submitted.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Tasks currently transferring.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Tasks that saved a file.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks that failed.
    #[must_use]
    pub fn errored(&self) -> usize {
        self.errored.load(Ordering::SeqCst)
    }

    /// Tasks that finished without saving, for a non-error reason.
    #[must_use]
    pub fn problems(&self) -> usize {
        self.problems.load(Ordering::SeqCst)
    }

    /// Bytes written by completed tasks.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Tasks submitted but not yet finished (queued plus in flight).
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Tasks finished in any way.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed() + self.errored() + self.problems()
    }

    /// Human-readable one-line summary, e.g. `3/10 files (1 errored, 0 skipped)`.
    #[must_use]
    pub fn status_line(&self) -> String {
        format!(
            "{}/{} files ({} errored, {} skipped)",
            self.finished(),
            self.submitted(),
            self.errored(),
            self.problems()
        )
    }

    fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.pending.send_modify(|pending| *pending += 1);
    }

    fn record_finished(&self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Completed(bytes) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(bytes, Ordering::SeqCst);
            }
            TaskOutcome::Errored => {
                self.errored.fetch_add(1, Ordering::SeqCst);
            }
            TaskOutcome::Problem => {
                self.problems.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.pending
            .send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}

#[derive(Debug, Clone, Copy)]
enum TaskOutcome {
    Completed(u64),
    Errored,
    Problem,
}

/// Marks one task finished when dropped.
///
/// A task that panics or is cancelled before recording an outcome counts as
/// errored, so the pending counter always returns to zero.
struct TaskGuard {
    state: Arc<PoolState>,
    outcome: Option<TaskOutcome>,
    running: bool,
}

impl TaskGuard {
    fn new(state: Arc<PoolState>) -> Self {
        Self {
            state,
            outcome: None,
            running: false,
        }
    }

    fn start(&mut self) {
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        self.running = true;
    }

    fn finish(&mut self, outcome: TaskOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.running {
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let outcome = self.outcome.take().unwrap_or(TaskOutcome::Errored);
        self.state.record_finished(outcome);
    }
}

/// Everything a worker needs, cloned into each spawned task.
#[derive(Clone)]
struct Worker {
    transport: Arc<dyn Transport>,
    status: StatusChannel,
    stop: StopHandle,
    retry_policy: RetryPolicy,
    overwrite: bool,
}

impl Worker {
    #[instrument(skip(self, task, guard), fields(url = %task.url()))]
    async fn execute(&self, task: DownloadTask, guard: &mut TaskGuard) {
        guard.start();

        if self.stop.is_stopped() {
            debug!("rip stopped, skipping queued download");
            self.problem(&task, "skipped: rip stopped".to_string());
            guard.finish(TaskOutcome::Problem);
            return;
        }

        if !self.overwrite {
            match tokio::fs::try_exists(task.destination()).await {
                Ok(false) => {}
                Ok(true) => {
                    self.problem(
                        &task,
                        format!("file already exists: {}", task.destination().display()),
                    );
                    guard.finish(TaskOutcome::Problem);
                    return;
                }
                Err(e) => {
                    warn!(path = %task.destination().display(), error = %e, "cannot check destination");
                    self.status.notify(StatusMessage::DownloadErrored {
                        url: task.url().clone(),
                        reason: DownloadError::io(task.destination(), e).to_string(),
                    });
                    guard.finish(TaskOutcome::Errored);
                    return;
                }
            }
        }

        match self.transfer_with_retry(&task).await {
            Ok(0) => {
                self.problem(&task, "empty response, file not saved".to_string());
                guard.finish(TaskOutcome::Problem);
            }
            Ok(bytes) => {
                info!(path = %task.destination().display(), bytes, "download completed");
                self.status.notify(StatusMessage::DownloadComplete {
                    url: task.url().clone(),
                    path: task.destination().to_path_buf(),
                });
                guard.finish(TaskOutcome::Completed(bytes));
            }
            Err((e, attempts)) => {
                warn!(error = %e, attempts, "download failed after all attempts");
                self.status.notify(StatusMessage::DownloadErrored {
                    url: task.url().clone(),
                    reason: e.to_string(),
                });
                guard.finish(TaskOutcome::Errored);
            }
        }
    }

    fn problem(&self, task: &DownloadTask, message: String) {
        debug!(url = %task.url(), %message, "download problem");
        self.status.notify(StatusMessage::DownloadProblem {
            url: task.url().clone(),
            message,
        });
    }

    /// Transfers with retries for transient failures.
    ///
    /// A stop request ends the retry loop after the current attempt.
    async fn transfer_with_retry(&self, task: &DownloadTask) -> Result<u64, (DownloadError, u32)> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "attempting download");

            match self.transport.download(task).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    if self.stop.is_stopped() {
                        return Err((e, attempt));
                    }
                    match self.retry_policy.decide(&e, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            info!(
                                url = %task.url(),
                                attempt = next_attempt,
                                max_attempts = self.retry_policy.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %e,
                                "retrying download"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %task.url(), %reason, "not retrying download");
                            return Err((e, attempt));
                        }
                    }
                }
            }
        }
    }
}

/// Bounded pool executing download tasks concurrently.
pub struct DownloadPool {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    state: Arc<PoolState>,
    worker: Worker,
}

impl DownloadPool {
    /// Creates a pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConcurrency`] if `config.concurrency` is
    /// outside 1-100.
    #[instrument(level = "debug", skip(config, transport, status, stop), fields(concurrency = config.concurrency))]
    pub fn new(
        config: PoolConfig,
        transport: Arc<dyn Transport>,
        status: StatusChannel,
        stop: StopHandle,
    ) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(PoolError::InvalidConcurrency {
                value: config.concurrency,
            });
        }

        debug!(
            max_retries = config.retry_policy.max_attempts(),
            overwrite = config.overwrite,
            "creating download pool"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            concurrency: config.concurrency,
            state: Arc::new(PoolState::new()),
            worker: Worker {
                transport,
                status,
                stop,
                retry_policy: config.retry_policy,
                overwrite: config.overwrite,
            },
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn state(&self) -> &Arc<PoolState> {
        &self.state
    }

    /// Returns the transport used for transfers.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.worker.transport
    }

    /// Replaces the status channel. Only valid before any task is submitted.
    pub fn set_status_channel(&mut self, status: StatusChannel) {
        self.worker.status = status;
    }

    /// Enqueues a task and returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, task), fields(url = %task.url()))]
    pub fn submit(&self, task: DownloadTask) {
        self.state.record_submitted();
        let mut guard = TaskGuard::new(Arc::clone(&self.state));
        let semaphore = Arc::clone(&self.semaphore);
        let worker = self.worker.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                warn!(url = %task.url(), "download pool closed before task started");
                return;
            };
            worker.execute(task, &mut guard).await;
        });
    }

    /// Waits until no task is queued or in flight.
    ///
    /// Every task submitted before this call has finished when it returns.
    /// Safe to call repeatedly and concurrently with `submit`.
    ///
    /// Only the latest pending count is observed. While another context keeps
    /// submitting, a momentary drop to zero can be missed and the wait lasts
    /// until the pool is idle again. The ripper is the only submitter during
    /// a rip, so it never sees this.
    #[instrument(skip(self))]
    pub async fn wait_for_threads(&self) {
        debug!(pending = self.state.pending(), "waiting for downloads to complete");
        let mut pending = self.state.pending.subscribe();
        // The sender lives in `self.state`, so the channel cannot close here.
        let _ = pending.wait_for(|count| *count == 0).await;
        debug!(
            completed = self.state.completed(),
            errored = self.state.errored(),
            problems = self.state.problems(),
            "download pool drained"
        );
    }
}

impl fmt::Debug for DownloadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadPool")
            .field("concurrency", &self.concurrency)
            .field("state", &self.state)
            .field("overwrite", &self.worker.overwrite)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use url::Url;

    use super::*;
    use crate::status::{StatusKind, StatusListener};

    /// Transport that writes a fixed body, tracking peak concurrency.
    #[derive(Default)]
    struct FakeTransport {
        body: Vec<u8>,
        fail_status: Option<u16>,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch_page(&self, _url: &Url) -> Result<String, DownloadError> {
            Ok(String::new())
        }

        async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if let Some(status) = self.fail_status {
                return Err(DownloadError::http_status(task.url().as_str(), status));
            }
            if self.body.is_empty() {
                return Ok(0);
            }
            tokio::fs::write(task.destination(), &self.body).await.unwrap();
            Ok(self.body.len() as u64)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StatusMessage>>);

    impl StatusListener for Recorder {
        fn on_status(&self, message: &StatusMessage) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    impl Recorder {
        fn count(&self, kind: StatusKind) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.kind() == kind)
                .count()
        }
    }

    fn pool_with(
        transport: Arc<FakeTransport>,
        concurrency: usize,
        recorder: Arc<Recorder>,
        stop: StopHandle,
    ) -> DownloadPool {
        let config = PoolConfig {
            concurrency,
            retry_policy: RetryPolicy::no_retry(),
            overwrite: false,
        };
        DownloadPool::new(config, transport, StatusChannel::with_listener(recorder), stop).unwrap()
    }

    fn task(dir: &TempDir, name: &str) -> DownloadTask {
        let url = Url::parse(&format!("https://example.com/{name}")).unwrap();
        DownloadTask::new(url, dir.path().join(name))
    }

    #[test]
    fn test_pool_rejects_invalid_concurrency() {
        let transport: Arc<dyn Transport> = Arc::new(FakeTransport::default());
        for value in [0, 101] {
            let config = PoolConfig {
                concurrency: value,
                ..PoolConfig::default()
            };
            let result = DownloadPool::new(
                config,
                Arc::clone(&transport),
                StatusChannel::new(),
                StopHandle::new(),
            );
            assert!(matches!(
                result,
                Err(PoolError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }

    #[test]
    fn test_pool_error_display() {
        let msg = PoolError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("100"));
    }

    #[tokio::test]
    async fn test_wait_for_threads_on_empty_pool_returns() {
        let recorder = Arc::new(Recorder::default());
        let pool = pool_with(
            Arc::new(FakeTransport::default()),
            2,
            recorder,
            StopHandle::new(),
        );
        pool.wait_for_threads().await;
        pool.wait_for_threads().await;
        assert_eq!(pool.state().pending(), 0);
    }

    #[tokio::test]
    async fn test_all_tasks_complete_and_drain() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(FakeTransport {
            body: b"data".to_vec(),
            delay: Duration::from_millis(5),
            ..FakeTransport::default()
        });
        let pool = pool_with(transport, 3, recorder.clone(), StopHandle::new());

        for i in 0..8 {
            pool.submit(task(&dir, &format!("{i}.jpg")));
        }
        pool.wait_for_threads().await;

        assert_eq!(pool.state().pending(), 0);
        assert_eq!(pool.state().completed(), 8);
        assert_eq!(pool.state().bytes(), 32);
        assert_eq!(recorder.count(StatusKind::DownloadComplete), 8);
        assert!(dir.path().join("7.jpg").exists());
    }

    #[tokio::test]
    async fn test_waiters_released_while_submissions_continue() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(FakeTransport {
            body: b"data".to_vec(),
            delay: Duration::from_millis(10),
            ..FakeTransport::default()
        });
        let pool = Arc::new(pool_with(transport, 2, recorder, StopHandle::new()));

        for i in 0..3 {
            pool.submit(task(&dir, &format!("first-{i}.jpg")));
        }
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.wait_for_threads().await;
                pool.state().completed()
            })
        };
        pool.submit(task(&dir, "late.jpg"));

        let completed_at_release = waiter.await.unwrap();
        assert!(completed_at_release >= 3);
        pool.wait_for_threads().await;
        assert_eq!(pool.state().completed(), 4);
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport {
            body: b"x".to_vec(),
            delay: Duration::from_millis(20),
            ..FakeTransport::default()
        });
        let pool = pool_with(
            Arc::clone(&transport),
            2,
            Arc::new(Recorder::default()),
            StopHandle::new(),
        );

        for i in 0..6 {
            pool.submit(task(&dir, &format!("{i}.png")));
        }
        pool.wait_for_threads().await;

        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(FakeTransport {
            fail_status: Some(404),
            ..FakeTransport::default()
        });
        let pool = pool_with(transport, 4, recorder.clone(), StopHandle::new());

        for i in 0..3 {
            pool.submit(task(&dir, &format!("{i}.gif")));
        }
        pool.wait_for_threads().await;

        assert_eq!(pool.state().errored(), 3);
        assert_eq!(recorder.count(StatusKind::DownloadErrored), 3);
        assert_eq!(pool.state().pending(), 0);
    }

    #[tokio::test]
    async fn test_existing_file_is_reported_as_problem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("dup.jpg"), b"old").unwrap();
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(FakeTransport {
            body: b"new".to_vec(),
            ..FakeTransport::default()
        });
        let pool = pool_with(Arc::clone(&transport), 1, recorder.clone(), StopHandle::new());

        pool.submit(task(&dir, "dup.jpg"));
        pool.wait_for_threads().await;

        assert_eq!(recorder.count(StatusKind::DownloadProblem), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(dir.path().join("dup.jpg")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_uncheckable_destination_is_errored_without_transfer() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocker"), b"not a directory").unwrap();
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(FakeTransport {
            body: b"new".to_vec(),
            ..FakeTransport::default()
        });
        let pool = pool_with(Arc::clone(&transport), 1, recorder.clone(), StopHandle::new());
        let url = Url::parse("https://example.com/a.jpg").unwrap();

        pool.submit(DownloadTask::new(url, dir.path().join("blocker").join("a.jpg")));
        pool.wait_for_threads().await;

        assert_eq!(recorder.count(StatusKind::DownloadErrored), 1);
        assert_eq!(recorder.count(StatusKind::DownloadProblem), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pool.state().errored(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_is_problem() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let pool = pool_with(
            Arc::new(FakeTransport::default()),
            1,
            recorder.clone(),
            StopHandle::new(),
        );

        pool.submit(task(&dir, "empty.jpg"));
        pool.wait_for_threads().await;

        assert_eq!(pool.state().problems(), 1);
        assert_eq!(recorder.count(StatusKind::DownloadProblem), 1);
        assert!(!dir.path().join("empty.jpg").exists());
    }

    #[tokio::test]
    async fn test_queued_tasks_skipped_after_stop() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let stop = StopHandle::new();
        stop.stop();
        let transport = Arc::new(FakeTransport {
            body: b"x".to_vec(),
            ..FakeTransport::default()
        });
        let pool = pool_with(Arc::clone(&transport), 2, recorder.clone(), stop);

        for i in 0..4 {
            pool.submit(task(&dir, &format!("{i}.jpg")));
        }
        pool.wait_for_threads().await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pool.state().problems(), 4);
        assert_eq!(pool.state().pending(), 0);
    }

    #[test]
    fn test_status_line_counts() {
        let state = PoolState::new();
        state.record_submitted();
        state.record_submitted();
        state.record_finished(TaskOutcome::Completed(10));
        assert_eq!(state.pending(), 1);
        assert_eq!(state.status_line(), "1/2 files (0 errored, 0 skipped)");
    }
}
