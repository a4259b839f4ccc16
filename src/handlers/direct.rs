//! Handler for URLs that point straight at a media file.

use async_trait::async_trait;
use url::Url;

use super::{is_media_url, is_web_url, last_segment, short_host};
use crate::ripper::{AlbumHandler, RipError, RipSession};

/// Downloads the single file the URL names.
#[derive(Debug, Clone)]
pub struct DirectMediaHandler {
    host: String,
}

impl DirectMediaHandler {
    /// Claims http(s) URLs whose last path segment has a media extension.
    #[must_use]
    pub fn probe(url: &Url) -> Option<Box<dyn AlbumHandler>> {
        if !is_web_url(url) || !is_media_url(url) {
            return None;
        }
        let host = short_host(url)?;
        Some(Box::new(Self {
            host: host.to_string(),
        }))
    }
}

#[async_trait]
impl AlbumHandler for DirectMediaHandler {
    fn host(&self) -> &str {
        &self.host
    }

    fn can_rip(&self, url: &Url) -> bool {
        is_web_url(url) && is_media_url(url)
    }

    fn gid(&self, url: &Url) -> Result<String, RipError> {
        last_segment(url)
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(stem, _)| stem.to_string())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| RipError::unsupported(url.as_str(), "URL does not name a file"))
    }

    async fn rip(&self, session: &RipSession<'_>) -> Result<(), RipError> {
        let file = session.url().clone();
        session.add_url(&file).await
    }
}
