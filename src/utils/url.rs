//! URL utilities for normalizing candidate media URLs found in page content

use url::Url;

/// Schemes that never identify an independently resolvable media resource
const EPHEMERAL_SCHEMES: &[&str] = &["blob:", "data:", "javascript:", "about:", "mediasource:"];

/// Extensions of static page assets that are never media, even when the path mentions "mp4" or "hls"
const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "map", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "avif",
    "woff", "woff2", "ttf", "otf", "eot", "html", "htm", "php", "json", "xml", "txt", "wasm",
];

/// Check if URL uses a scheme that cannot be fetched on its own (blob, data, ...)
pub fn is_ephemeral_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    EPHEMERAL_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Undo the escaping commonly applied to URLs embedded in scripts and attributes
pub fn unescape_embedded_url(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("\\u002F", "/")
        .replace("&amp;", "&")
}

/// Normalize a raw URL found in a page into an absolute http(s) URL
///
/// Relative and protocol-relative URLs are resolved against `base` when it is
/// given. Returns `None` for empty values, ephemeral schemes and anything that
/// does not end up as http(s).
pub fn normalize_media_url(raw: &str, base: Option<&str>) -> Option<String> {
    let cleaned = unescape_embedded_url(raw);
    if cleaned.is_empty() || is_ephemeral_url(&cleaned) {
        return None;
    }

    let parsed = match Url::parse(&cleaned) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            if let Some(rest) = cleaned.strip_prefix("//") {
                Url::parse(&format!("https://{}", rest)).ok()?
            } else {
                let base = Url::parse(base?).ok()?;
                base.join(&cleaned).ok()?
            }
        }
        Err(_) => return None,
    };

    match parsed.scheme() {
        "http" | "https" => Some(parsed.to_string()),
        _ => None,
    }
}

/// Lowercased extension of the URL path, ignoring query string and fragment
pub fn path_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Check if URL points at a static page asset (scripts, styles, images, fonts)
pub fn is_static_asset(url: &str) -> bool {
    path_extension(url)
        .map(|ext| STATIC_ASSET_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
