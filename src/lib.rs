//! Ripper Core Library
//!
//! Downloads an "album" (the files discovered from one source URL) into a
//! local directory, with bounded concurrent transfers, cooperative
//! cancellation, and typed progress events.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`registry`] - Resolves a URL to the first handler that can process it
//! - [`ripper`] - Per-album lifecycle: run, stop, completion, cleanup
//! - [`download`] - Bounded download pool, HTTP transport, filename rules
//! - [`status`] - Status events and the single-listener channel
//! - [`handlers`] - Built-in album handlers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod handlers;
pub mod registry;
pub mod ripper;
pub mod status;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadError, DownloadPool, DownloadTask,
    HttpClient, PoolConfig, PoolError, PoolState, RetryPolicy, SaveOptions, Transport,
};
pub use registry::{HandlerFactory, HandlerGroup, HandlerRegistry, build_default_registry};
pub use ripper::{
    AlbumHandler, ProgressHandle, RipConfig, RipError, RipSession, RipState, Ripper, StopHandle,
};
pub use status::{StatusChannel, StatusKind, StatusListener, StatusMessage};
