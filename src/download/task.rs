//! Download task and submission options.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use url::Url;

/// Cookies sent with a single download, name to value.
pub type Cookies = BTreeMap<String, String>;

/// Caller-supplied options for naming and requesting one file.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Text prepended to the sanitized filename.
    pub prefix: String,
    /// Optional directory below the working directory.
    pub subdirectory: Option<String>,
    /// Referer header to send.
    pub referrer: Option<Url>,
    /// Cookies to send.
    pub cookies: Cookies,
}

impl SaveOptions {
    /// Options with only a filename prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Sets the subdirectory.
    #[must_use]
    pub fn subdirectory(mut self, subdirectory: impl Into<String>) -> Self {
        self.subdirectory = Some(subdirectory.into());
        self
    }

    /// Sets the referrer.
    #[must_use]
    pub fn referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Adds a cookie.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

/// One file to fetch and where to put it. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    url: Url,
    destination: PathBuf,
    referrer: Option<Url>,
    cookies: Cookies,
}

impl DownloadTask {
    /// Creates a task with no referrer and no cookies.
    #[must_use]
    pub fn new(url: Url, destination: impl Into<PathBuf>) -> Self {
        Self {
            url,
            destination: destination.into(),
            referrer: None,
            cookies: Cookies::new(),
        }
    }

    /// Creates a task with request context.
    #[must_use]
    pub fn with_context(
        url: Url,
        destination: impl Into<PathBuf>,
        referrer: Option<Url>,
        cookies: Cookies,
    ) -> Self {
        Self {
            url,
            destination: destination.into(),
            referrer,
            cookies,
        }
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn referrer(&self) -> Option<&Url> {
        self.referrer.as_ref()
    }

    #[must_use]
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// Formats cookies as a `Cookie` header value, `None` when there are none.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Some(pairs.join("; "))
    }
}
