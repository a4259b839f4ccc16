//! Built-in album handlers.
//!
//! - [`PageImageHandler`] - any web page; downloads the images it links or embeds
//! - [`DirectMediaHandler`] - a URL that points straight at a media file

mod direct;
mod page;

pub use direct::DirectMediaHandler;
pub use page::PageImageHandler;

use url::Url;

/// Image extensions, lower case.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "avif", "heic",
];

/// Video and audio extensions, lower case.
pub const VIDEO_AUDIO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mkv", "mov", "avi", "m4v", "mp3", "m4a", "ogg", "flac", "wav",
];

/// Returns true for `http` and `https` URLs.
fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Last non-empty path segment of `url`.
fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.rev().find(|segment| !segment.is_empty())
}

/// Lower-cased extension of the last path segment.
fn extension(url: &Url) -> Option<String> {
    let segment = last_segment(url)?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn is_image_url(url: &Url) -> bool {
    extension(url).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn is_media_url(url: &Url) -> bool {
    extension(url).is_some_and(|ext| {
        IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_AUDIO_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Host without a leading `www.`, or `None` for host-less URLs.
fn short_host(url: &Url) -> Option<&str> {
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host))
}
