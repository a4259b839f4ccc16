//! Filename extraction, sanitization, and destination path resolution.
//!
//! Destinations are computed once, when a task is submitted:
//! `working_dir/[subdirectory/]<prefix><filename>`, where `<filename>` is the
//! text after the URL's last `/` cut at the first `?`, `#`, `&` or `:`.

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::SaveOptions;

/// Used when a URL yields an empty filename (e.g. `https://host/`).
const FALLBACK_FILENAME: &str = "download";

/// Characters that end the filename part of a URL, in cut order.
const FILENAME_TERMINATORS: [char; 4] = ['?', '#', '&', ':'];

/// Cuts a raw URL tail at the first query, fragment, `&` or `:` character.
///
/// Each terminator is applied in turn, so the leftmost cut wins.
#[must_use]
pub fn truncate_filename(raw: &str) -> &str {
    FILENAME_TERMINATORS
        .iter()
        .fold(raw, |name, terminator| match name.find(*terminator) {
            Some(index) => &name[..index],
            None => name,
        })
}

/// Derives the bare filename for a URL.
///
/// Operates on the serialized URL rather than the parsed path so that the
/// query string participates in the `/` split exactly as it appears.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    let external = url.as_str();
    let tail = external.rsplit('/').next().unwrap_or(external);
    let name = sanitize_path_component(truncate_filename(tail));
    if name.trim_matches('_').is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        name
    }
}

/// Sanitizes one path component for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) and rewrites dot segments
/// so the result can never climb out of its parent directory.
#[must_use]
pub fn sanitize_path_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Resolves where a URL is saved inside `working_dir`.
///
/// The subdirectory may contain `/`-separated parts; each part is sanitized
/// and empty parts are dropped.
#[must_use]
pub fn resolve_destination(working_dir: &Path, url: &Url, options: &SaveOptions) -> PathBuf {
    let mut path = working_dir.to_path_buf();
    if let Some(subdirectory) = options.subdirectory.as_deref() {
        for part in subdirectory.split(['/', '\\']).filter(|p| !p.is_empty()) {
            path.push(sanitize_path_component(part));
        }
    }
    let prefix = sanitize_path_component(&options.prefix);
    path.push(format!("{prefix}{}", filename_from_url(url)));
    path
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_truncate_query() {
        assert_eq!(truncate_filename("file.jpg?x=1"), "file.jpg");
    }

    #[test]
    fn test_truncate_fragment() {
        assert_eq!(truncate_filename("file.jpg#frag"), "file.jpg");
    }

    #[test]
    fn test_truncate_ampersand() {
        assert_eq!(truncate_filename("a&b.png"), "a");
    }

    #[test]
    fn test_truncate_colon() {
        assert_eq!(truncate_filename("a:b.png"), "a");
    }

    #[test]
    fn test_truncate_leftmost_cut_wins() {
        assert_eq!(truncate_filename("a#b?c"), "a");
        assert_eq!(truncate_filename("a&b#c?d:e"), "a");
    }

    #[test]
    fn test_filename_from_url_variants() {
        assert_eq!(filename_from_url(&url("http://h/dir/file.jpg?x=1")), "file.jpg");
        assert_eq!(filename_from_url(&url("http://h/file.jpg#frag")), "file.jpg");
        assert_eq!(filename_from_url(&url("http://h/a&b.png")), "a");
        assert_eq!(filename_from_url(&url("http://h/a:b.png")), "a");
    }

    #[test]
    fn test_filename_from_url_empty_uses_fallback() {
        assert_eq!(filename_from_url(&url("https://example.com/")), "download");
        assert_eq!(filename_from_url(&url("https://example.com/dir/?x=1")), "download");
    }

    #[test]
    fn test_sanitize_path_component_replaces_invalid_chars() {
        assert_eq!(sanitize_path_component("file\\name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_path_component("file*name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_path_component("file<name>.jpg"), "file_name_.jpg");
        assert_eq!(sanitize_path_component("file|name.jpg"), "file_name.jpg");
    }

    #[test]
    fn test_sanitize_path_component_rewrites_dot_segments() {
        assert_eq!(sanitize_path_component("."), "_");
        assert_eq!(sanitize_path_component(".."), "__");
        assert_eq!(sanitize_path_component("a.b"), "a.b");
    }

    #[test]
    fn test_resolve_destination_plain() {
        let dest = resolve_destination(
            Path::new("/rips/example.com_1"),
            &url("https://example.com/img/cat.png?size=large"),
            &SaveOptions::default(),
        );
        assert_eq!(dest, PathBuf::from("/rips/example.com_1/cat.png"));
    }

    #[test]
    fn test_resolve_destination_prefix_and_subdirectory() {
        let options = SaveOptions::with_prefix("007_").subdirectory("part 2");
        let dest = resolve_destination(
            Path::new("/rips/album"),
            &url("https://example.com/img/cat.png"),
            &options,
        );
        assert_eq!(dest, PathBuf::from("/rips/album/part 2/007_cat.png"));
    }

    #[test]
    fn test_resolve_destination_subdirectory_cannot_escape() {
        let options = SaveOptions::default().subdirectory("../../etc");
        let dest = resolve_destination(
            Path::new("/rips/album"),
            &url("https://example.com/passwd"),
            &options,
        );
        assert!(dest.starts_with("/rips/album"));
        assert!(
            !dest
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        );
    }
}
