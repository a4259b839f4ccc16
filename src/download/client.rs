//! HTTP transport for album pages and files.
//!
//! The [`Transport`] trait is the seam between the download pool and the
//! network. [`HttpClient`] is the reqwest-backed implementation; tests swap
//! in scripted transports.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::{DownloadError, DownloadTask};

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Browser User-Agent sent with every request.
///
/// Many image hosts reject unknown clients outright.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Suffix of the temporary file a transfer streams into.
const PART_SUFFIX: &str = ".part";

/// Numbers part files so concurrent transfers never share one.
static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fetches pages and files.
///
/// # Object Safety
///
/// Uses `async_trait` so the pool can hold an `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a page body as text.
    async fn fetch_page(&self, url: &Url) -> Result<String, DownloadError>;

    /// Transfers `task.url()` to `task.destination()`, returning bytes written.
    ///
    /// A zero-byte response must leave no file at the destination.
    async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError>;
}

/// HTTP client for pages and streaming file downloads.
///
/// Created once per process and shared, taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the browser User-Agent and default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_settings(BROWSER_USER_AGENT, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with an explicit User-Agent and timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error (e.g. TLS backend initialization).
    #[instrument(level = "debug")]
    pub fn with_settings(
        user_agent: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    async fn get(
        &self,
        url: &Url,
        referrer: Option<&Url>,
        cookie_header: Option<String>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url.clone());
        if let Some(referrer) = referrer {
            request = request.header(REFERER, referrer.as_str());
        }
        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_page(&self, url: &Url) -> Result<String, DownloadError> {
        let response = self.get(url, None, None).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::from_reqwest(url.as_str(), e))
    }

    #[instrument(skip(self, task), fields(url = %task.url(), path = %task.destination().display()))]
    async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError> {
        debug!("starting download");
        let response = self
            .get(task.url(), task.referrer(), task.cookie_header())
            .await?;

        let part_path = part_path(task.destination());
        let stream_result = stream_to_part(response, task.url(), &part_path).await;
        let bytes_written = match stream_result {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if bytes_written == 0 {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Ok(0);
        }

        tokio::fs::rename(&part_path, task.destination())
            .await
            .map_err(|e| DownloadError::io(task.destination(), e))?;

        info!(bytes = bytes_written, "download complete");
        Ok(bytes_written)
    }
}

/// `<dest>.<pid>-<seq>.part`, unique per transfer.
///
/// Two tasks aimed at one destination each stream into their own file; the
/// last rename wins and the destination always holds one complete body.
fn part_path(destination: &Path) -> PathBuf {
    let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = destination.as_os_str().to_os_string();
    name.push(format!(".{}-{seq}{PART_SUFFIX}", std::process::id()));
    PathBuf::from(name)
}

/// Streams a response body into `part_path`, returning bytes written.
async fn stream_to_part(
    response: reqwest::Response,
    url: &Url,
    part_path: &Path,
) -> Result<u64, DownloadError> {
    let file = File::create(part_path)
        .await
        .map_err(|e| DownloadError::io(part_path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(part_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(part_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path_is_unique_per_transfer() {
        let destination = Path::new("/rips/album/cat.png");
        let first = part_path(destination);
        let second = part_path(destination);

        assert_ne!(first, second);
        for part in [&first, &second] {
            assert_eq!(part.parent(), destination.parent());
            let name = part.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("cat.png."), "{name}");
            assert!(name.ends_with(".part"), "{name}");
        }
    }

    #[test]
    fn test_with_settings_builds_client() {
        assert!(HttpClient::with_settings("ripper-test", 5, 5).is_ok());
    }
}
