//! Regex mining of URLs from script text

use crate::utils::url::{is_static_asset, normalize_media_url};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>`\\|)\]}]+"#).expect("url regex is valid")
});

static STREAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\.(?:m3u8|mpd|mp4|webm|m4s|mkv)(?:[?#/&]|$)|\.ts(?:[?#]|$)|/(?:hls|dash)\d*/|/(?:manifest|playlist|stream)(?:[/?#.]|$)|master\.",
    )
    .expect("stream regex is valid")
});

static MEDIA_ASSIGNMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:file|src|source|url|hls|hlsUrl|manifest|video_url|videoUrl)["']?\s*[:=]\s*["']([^"'\s]+\.(?:m3u8|mpd|mp4|webm)[^"'\s]*)["']"#,
    )
    .expect("media assignment regex is valid")
});

/// Extract absolute http(s) URLs in first-seen order, without duplicates
///
/// JSON-escaped slashes (`https:\/\/...`) are understood.
pub fn extract_urls(text: &str) -> Vec<String> {
    let unescaped = text.replace("\\/", "/");
    let mut seen = HashSet::new();
    URL_REGEX
        .find_iter(&unescaped)
        .map(|m| trim_trailing_punctuation(m.as_str()).replace("&amp;", "&"))
        .filter(|url| url.len() > "https://".len())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Check if URL looks like a stream: manifests, progressive files, segments or known path fragments
pub fn is_stream_url(url: &str) -> bool {
    STREAM_REGEX.is_match(url) && !is_static_asset(url)
}

/// Extract only the stream-looking URLs
pub fn extract_stream_urls(text: &str) -> Vec<String> {
    extract_urls(text)
        .into_iter()
        .filter(|url| is_stream_url(url))
        .collect()
}

/// Extract media URLs assigned to conventional keys (`file:`, `src=`, ...), resolving relative paths
pub fn extract_media_assignments(text: &str, base: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    MEDIA_ASSIGNMENT_REGEX
        .captures_iter(text)
        .filter_map(|caps| normalize_media_url(&caps[1], base))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Merge `incoming` into `target`, keeping first-seen order
pub fn merge_unique(target: &mut Vec<String>, incoming: impl IntoIterator<Item = String>) {
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    for url in incoming {
        if seen.insert(url.clone()) {
            target.push(url);
        }
    }
}

fn trim_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', '\'', '"'])
}
