//! Concurrent file downloads for a single album.
//!
//! This module provides the bounded [`DownloadPool`] that executes
//! [`DownloadTask`]s, the [`Transport`] seam that performs the actual
//! transfers, and the filename rules used to place files under an album's
//! working directory.
//!
//! # Features
//!
//! - Bounded concurrency (semaphore permit per running transfer)
//! - Point-in-time drain barrier via [`DownloadPool::wait_for_threads`]
//! - Streaming transfers with `.part` files (memory-efficient for large files)
//! - Retry with exponential backoff for transient failures
//! - Per-task outcomes reported through the [`StatusChannel`](crate::status::StatusChannel)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ripper_core::download::{DownloadPool, DownloadTask, HttpClient, PoolConfig};
//! use ripper_core::ripper::StopHandle;
//! use ripper_core::status::StatusChannel;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = DownloadPool::new(
//!     PoolConfig::default(),
//!     Arc::new(HttpClient::new()),
//!     StatusChannel::new(),
//!     StopHandle::new(),
//! )?;
//! let url = Url::parse("https://example.com/photo.jpg")?;
//! pool.submit(DownloadTask::new(url, "./album/photo.jpg"));
//! pool.wait_for_threads().await;
//! println!("{}", pool.state().status_line());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod filename;
mod pool;
mod retry;
mod task;

pub use client::{
    BROWSER_USER_AGENT, CONNECT_TIMEOUT_SECS, HttpClient, READ_TIMEOUT_SECS, Transport,
};
pub use error::DownloadError;
pub use pool::{
    DEFAULT_CONCURRENCY, DownloadPool, MAX_CONCURRENCY, MIN_CONCURRENCY, PoolConfig, PoolError,
    PoolState,
};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use task::{Cookies, DownloadTask, SaveOptions};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
