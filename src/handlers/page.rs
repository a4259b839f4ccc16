//! Generic web page handler.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use super::{is_image_url, is_media_url, is_web_url, short_host};
use crate::download::SaveOptions;
use crate::ripper::{AlbumHandler, RipError, RipSession};

/// `src` / `href` attribute values of `<img>` and `<a>` tags.
#[allow(clippy::expect_used)]
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:img|a)\b[^>]*?\b(?:src|href)\s*=\s*["']([^"']+)["']"#)
        .expect("link regex is valid")
});

/// Downloads every image a page embeds or links to, in page order.
///
/// Files are numbered `001_`, `002_`, ... and requested with the page as
/// referrer.
#[derive(Debug, Clone)]
pub struct PageImageHandler {
    host: String,
}

impl PageImageHandler {
    /// Claims http(s) URLs that do not point directly at a media file.
    #[must_use]
    pub fn probe(url: &Url) -> Option<Box<dyn AlbumHandler>> {
        if !is_web_url(url) || is_media_url(url) {
            return None;
        }
        let host = short_host(url)?;
        Some(Box::new(Self {
            host: host.to_string(),
        }))
    }
}

#[async_trait]
impl AlbumHandler for PageImageHandler {
    fn host(&self) -> &str {
        &self.host
    }

    fn can_rip(&self, url: &Url) -> bool {
        is_web_url(url) && !is_media_url(url) && short_host(url) == Some(self.host.as_str())
    }

    fn gid(&self, url: &Url) -> Result<String, RipError> {
        let path = url.path().trim_matches('/');
        if path.is_empty() {
            Ok("index".to_string())
        } else {
            Ok(path.replace('/', "_"))
        }
    }

    async fn rip(&self, session: &RipSession<'_>) -> Result<(), RipError> {
        let page = session.url().clone();
        let html = session.fetch_page(&page).await?;
        let images = extract_image_urls(&html, &page);
        info!(url = %page, images = images.len(), "found images on page");

        for (index, image) in images.iter().enumerate() {
            let options =
                SaveOptions::with_prefix(format!("{:03}_", index + 1)).referrer(page.clone());
            session.add_url_to_download(image, options).await?;
        }
        Ok(())
    }
}

/// Image URLs referenced by `html`, resolved against `base`, first occurrence kept.
fn extract_image_urls(html: &str, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    LINK_PATTERN
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|raw| {
            let value = raw.as_str().trim().replace("&amp;", "&");
            match base.join(&value) {
                Ok(url) => Some(url),
                Err(e) => {
                    debug!(value = %value, error = %e, "skipping unparseable link");
                    None
                }
            }
        })
        .filter(|url| is_web_url(url) && is_image_url(url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
