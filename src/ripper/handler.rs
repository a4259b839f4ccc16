//! The capability contract every site handler implements.

use async_trait::async_trait;
use url::Url;

use super::{RipError, RipSession};

/// A site-specific handler that validates URLs and discovers album files.
///
/// Handlers are stateless with respect to a rip: everything they need while
/// extracting is reached through the [`RipSession`].
#[async_trait]
pub trait AlbumHandler: Send + Sync {
    /// Short host identifier, used in album titles (e.g. `imgur`).
    fn host(&self) -> &str;

    /// Returns true if this handler can process `url`.
    fn can_rip(&self, url: &Url) -> bool;

    /// Extracts the album identifier from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RipError::UnsupportedUrl`] if no identifier can be found.
    fn gid(&self, url: &Url) -> Result<String, RipError>;

    /// Canonicalizes `url` before the rip starts. Drops the fragment by default.
    ///
    /// # Errors
    ///
    /// Handlers may reject the URL here.
    fn sanitize_url(&self, mut url: Url) -> Result<Url, RipError> {
        url.set_fragment(None);
        Ok(url)
    }

    /// Album title, which names the working directory. Defaults to `host_gid`.
    ///
    /// # Errors
    ///
    /// Propagates [`AlbumHandler::gid`] failures.
    fn album_title(&self, url: &Url) -> Result<String, RipError> {
        Ok(format!("{}_{}", self.host(), self.gid(url)?))
    }

    /// Discovers files and submits them through `session`.
    ///
    /// # Errors
    ///
    /// Any error aborts the rip; in-flight downloads are drained first.
    async fn rip(&self, session: &RipSession<'_>) -> Result<(), RipError>;
}
