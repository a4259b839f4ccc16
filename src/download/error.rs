//! Failures of a single transfer.
//!
//! A `DownloadError` is reported for its own task through the status
//! channel. Sibling tasks and the rip itself carry on.

use std::path::PathBuf;

use thiserror::Error;

/// Why one file or page could not be fetched.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection, DNS or TLS failure, or a body cut off mid-stream.
    #[error("could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    /// The server answered with a non-success status.
    #[error("server returned {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Writing the part file or renaming it into the album failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Splits reqwest failures into timeouts and everything else.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// The HTTP status, when the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
