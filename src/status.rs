//! Typed status events delivered from a rip to its observer.
//!
//! A [`StatusChannel`] forwards [`StatusMessage`] values to at most one
//! [`StatusListener`]. When no listener is attached, notifications are
//! dropped. The listener is attached before a rip starts and is not
//! swapped while it runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// Fixed set of status event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    /// A page or resource is being fetched for link discovery.
    LoadingResource,
    /// A file finished downloading.
    DownloadComplete,
    /// A file failed to download.
    DownloadErrored,
    /// Non-fatal issue; the file was not saved.
    DownloadProblem,
    /// The album finished successfully.
    RipComplete,
    /// The album was aborted by a fatal error.
    RipErrored,
}

impl StatusKind {
    /// Returns the stable upper-case label for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadingResource => "LOADING_RESOURCE",
            Self::DownloadComplete => "DOWNLOAD_COMPLETE",
            Self::DownloadErrored => "DOWNLOAD_ERRORED",
            Self::DownloadProblem => "DOWNLOAD_PROBLEM",
            Self::RipComplete => "RIP_COMPLETE",
            Self::RipErrored => "RIP_ERRORED",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status event with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusMessage {
    /// A page is being retrieved.
    LoadingResource {
        /// Page URL.
        url: Url,
    },
    /// A file was saved.
    DownloadComplete {
        /// Source URL.
        url: Url,
        /// Where the file was written.
        path: PathBuf,
    },
    /// A file could not be downloaded.
    DownloadErrored {
        /// Source URL.
        url: Url,
        /// Human-readable reason.
        reason: String,
    },
    /// A file was not saved, but not because of an error.
    DownloadProblem {
        /// Source URL.
        url: Url,
        /// Human-readable explanation.
        message: String,
    },
    /// The whole album finished.
    RipComplete {
        /// The album's working directory.
        dir: PathBuf,
    },
    /// The album was aborted.
    RipErrored {
        /// Human-readable reason.
        reason: String,
    },
}

impl StatusMessage {
    /// Returns the kind of this message.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::LoadingResource { .. } => StatusKind::LoadingResource,
            Self::DownloadComplete { .. } => StatusKind::DownloadComplete,
            Self::DownloadErrored { .. } => StatusKind::DownloadErrored,
            Self::DownloadProblem { .. } => StatusKind::DownloadProblem,
            Self::RipComplete { .. } => StatusKind::RipComplete,
            Self::RipErrored { .. } => StatusKind::RipErrored,
        }
    }

    /// Returns true for `RIP_COMPLETE` and `RIP_ERRORED`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RipComplete { .. } | Self::RipErrored { .. })
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingResource { url } => write!(f, "{}: {url}", self.kind()),
            Self::DownloadComplete { url, path } => {
                write!(f, "{}: {url} -> {}", self.kind(), path.display())
            }
            Self::DownloadErrored { url, reason } => write!(f, "{}: {url}: {reason}", self.kind()),
            Self::DownloadProblem { url, message } => {
                write!(f, "{}: {url}: {message}", self.kind())
            }
            Self::RipComplete { dir } => write!(f, "{}: {}", self.kind(), dir.display()),
            Self::RipErrored { reason } => write!(f, "{}: {reason}", self.kind()),
        }
    }
}

/// Receives status events from a rip.
///
/// Called synchronously from the rip's own task and from download workers,
/// so implementations must be cheap and must not block.
pub trait StatusListener: Send + Sync {
    /// Handles one status event.
    fn on_status(&self, message: &StatusMessage);
}

impl StatusListener for UnboundedSender<StatusMessage> {
    fn on_status(&self, message: &StatusMessage) {
        // Receiver gone means nobody is watching anymore.
        let _ = self.send(message.clone());
    }
}

/// Delivers events to zero or one listener.
#[derive(Clone, Default)]
pub struct StatusChannel {
    listener: Option<Arc<dyn StatusListener>>,
}

impl StatusChannel {
    /// Creates a channel with no listener attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel forwarding to `listener`.
    #[must_use]
    pub fn with_listener(listener: Arc<dyn StatusListener>) -> Self {
        Self {
            listener: Some(listener),
        }
    }

    /// Returns true if a listener is attached.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Forwards `message` to the listener, if any.
    pub fn notify(&self, message: StatusMessage) {
        if let Some(listener) = &self.listener {
            listener.on_status(&message);
        }
    }
}

impl fmt::Debug for StatusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusChannel")
            .field("has_listener", &self.has_listener())
            .finish()
    }
}
