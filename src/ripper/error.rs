//! Error types for album rips.
//!
//! Construction errors (`NoCompatibleHandler`, `UnsupportedUrl`, `Pool`) are
//! returned to the caller. Everything raised during [`Ripper::run`] is
//! converted into a `RIP_ERRORED` status event instead.
//!
//! [`Ripper::run`]: super::Ripper::run

use std::path::PathBuf;

use thiserror::Error;

use crate::download::{DownloadError, PoolError};

/// Errors raised while resolving, constructing, or running a rip.
#[derive(Debug, Error)]
pub enum RipError {
    /// No registered handler claims the URL.
    #[error("no compatible ripper found for {url}")]
    NoCompatibleHandler {
        /// The URL that nothing could process.
        url: String,
    },

    /// The bound handler rejects the URL.
    #[error("unsupported URL {url}: {reason}")]
    UnsupportedUrl {
        /// The rejected URL.
        url: String,
        /// Why the handler rejected it.
        reason: String,
    },

    /// A page fetch during extraction returned an error status.
    #[error("Status={status}, URL={url}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// The page that failed.
        url: String,
    },

    /// A page fetch failed below the HTTP layer (DNS, connect, timeout).
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// The page that failed.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// Local filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A stop check observed the stop flag.
    #[error("Ripping interrupted")]
    Interrupted,

    /// The download pool could not be created.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl RipError {
    /// Creates an unsupported URL error.
    pub fn unsupported(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, status: u16) -> Self {
        Self::Transport {
            status,
            url: url.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps a page-fetch failure into the rip error taxonomy.
    #[must_use]
    pub fn from_fetch(error: DownloadError) -> Self {
        match error {
            DownloadError::HttpStatus { url, status } => Self::Transport { status, url },
            DownloadError::Timeout { url } => Self::Network {
                url,
                reason: "request timed out".to_string(),
            },
            DownloadError::Network { url, source } => Self::Network {
                url,
                reason: source.to_string(),
            },
            DownloadError::Io { path, source } => Self::Io { path, source },
        }
    }

    /// Returns true for [`RipError::Interrupted`].
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
