//! The API a handler uses while extracting an album.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use url::Url;

use super::{RipError, StopHandle};
use crate::download::filename::resolve_destination;
use crate::download::{Cookies, DownloadPool, DownloadTask, SaveOptions};
use crate::status::{StatusChannel, StatusMessage};

/// Borrowed view of a running rip, handed to [`AlbumHandler::rip`].
///
/// [`AlbumHandler::rip`]: super::AlbumHandler::rip
pub struct RipSession<'a> {
    url: &'a Url,
    working_dir: &'a Path,
    pool: &'a DownloadPool,
    status: &'a StatusChannel,
    stop: &'a StopHandle,
}

impl<'a> RipSession<'a> {
    pub(crate) fn new(
        url: &'a Url,
        working_dir: &'a Path,
        pool: &'a DownloadPool,
        status: &'a StatusChannel,
        stop: &'a StopHandle,
    ) -> Self {
        Self {
            url,
            working_dir,
            pool,
            status,
            stop,
        }
    }

    /// The sanitized album URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        self.url
    }

    /// Directory files are saved under.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        self.working_dir
    }

    /// Returns true once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Cooperative cancellation checkpoint.
    ///
    /// # Errors
    ///
    /// If a stop was requested, waits for in-flight downloads and returns
    /// [`RipError::Interrupted`].
    pub async fn stop_check(&self) -> Result<(), RipError> {
        if self.stop.is_stopped() {
            info!(url = %self.url, "stop requested, draining downloads");
            self.pool.wait_for_threads().await;
            return Err(RipError::Interrupted);
        }
        Ok(())
    }

    /// Submits `url` for download under the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`RipError::Interrupted`] after a stop, or [`RipError::Io`]
    /// if the parent directory cannot be created.
    pub async fn add_url_to_download(
        &self,
        url: &Url,
        options: SaveOptions,
    ) -> Result<(), RipError> {
        let destination = resolve_destination(self.working_dir, url, &options);
        self.add_url_to_path(url, destination, options.referrer, options.cookies)
            .await
    }

    /// Submits `url` with the plain sanitized filename.
    ///
    /// # Errors
    ///
    /// See [`RipSession::add_url_to_download`].
    pub async fn add_url(&self, url: &Url) -> Result<(), RipError> {
        self.add_url_to_download(url, SaveOptions::default()).await
    }

    /// Submits `url` with `prefix` prepended to its filename.
    ///
    /// # Errors
    ///
    /// See [`RipSession::add_url_to_download`].
    pub async fn add_url_with_prefix(&self, url: &Url, prefix: &str) -> Result<(), RipError> {
        self.add_url_to_download(url, SaveOptions::with_prefix(prefix))
            .await
    }

    /// Submits `url` to an explicit destination, which is used as given.
    ///
    /// # Errors
    ///
    /// See [`RipSession::add_url_to_download`].
    #[instrument(skip(self, path, referrer, cookies), fields(url = %url))]
    pub async fn add_url_to_path(
        &self,
        url: &Url,
        path: impl Into<PathBuf>,
        referrer: Option<Url>,
        cookies: Cookies,
    ) -> Result<(), RipError> {
        self.stop_check().await?;

        let path = path.into();
        if let Some(parent) = path.parent() {
            // create_dir_all treats a concurrently created directory as success.
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RipError::io(parent, e))?;
        }

        debug!(path = %path.display(), "queueing download");
        self.pool
            .submit(DownloadTask::with_context(url.clone(), path, referrer, cookies));
        Ok(())
    }

    /// Announces that a page is being fetched.
    pub fn retrieving_source(&self, url: &Url) {
        self.status
            .notify(StatusMessage::LoadingResource { url: url.clone() });
    }

    /// Fetches a page body, announcing it first.
    ///
    /// # Errors
    ///
    /// HTTP error statuses become [`RipError::Transport`]; other failures
    /// become [`RipError::Network`] or [`RipError::Io`].
    pub async fn fetch_page(&self, url: &Url) -> Result<String, RipError> {
        self.retrieving_source(url);
        self.pool
            .transport()
            .fetch_page(url)
            .await
            .map_err(RipError::from_fetch)
    }

    /// Waits for every download submitted so far. Does not finish the rip.
    pub async fn wait_for_threads(&self) {
        self.pool.wait_for_threads().await;
    }

    /// Sends an arbitrary status event.
    pub fn send_update(&self, message: StatusMessage) {
        self.status.notify(message);
    }
}
