//! MIME type and extension utilities for classifying media URLs

use crate::media::candidate::MediaKind;
use crate::utils::url::path_extension;

/// Get media kind from a MIME type as found in `<source type=...>` or player configs
pub fn kind_from_mime(mime_type: &str) -> MediaKind {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        // Manifests
        "application/x-mpegurl"
        | "application/vnd.apple.mpegurl"
        | "audio/mpegurl"
        | "audio/x-mpegurl"
        | "application/dash+xml"
        | "hls"
        | "dash" => MediaKind::Manifest,

        // Segments
        "video/mp2t" | "video/iso.segment" => MediaKind::Segment,

        // Progressive files
        "video/mp4" | "video/webm" | "video/ogg" | "video/quicktime" | "video/x-matroska"
        | "video/x-flv" | "audio/mp4" | "audio/mpeg" | "audio/ogg" | "audio/webm" | "mp4"
        | "webm" => MediaKind::Primary,

        _ => MediaKind::Unknown,
    }
}

/// Get media kind from the URL's path extension and well-known path fragments
pub fn kind_from_url(url: &str) -> MediaKind {
    match path_extension(url).as_deref() {
        Some("m3u8") | Some("m3u") | Some("mpd") => return MediaKind::Manifest,
        Some("ts") | Some("m4s") | Some("m4v") | Some("m4a") | Some("aac") | Some("cmfv")
        | Some("cmfa") => return MediaKind::Segment,
        Some("mp4") | Some("webm") | Some("mkv") | Some("mov") | Some("flv") | Some("ogv")
        | Some("mp3") | Some("ogg") => return MediaKind::Primary,
        _ => {}
    }

    let lower = url.to_ascii_lowercase();
    if lower.contains("/manifest") || lower.contains("master.") || lower.contains("/playlist") {
        MediaKind::Manifest
    } else if lower.contains("/seg-") || lower.contains("/segment") || lower.contains("/frag") {
        MediaKind::Segment
    } else {
        MediaKind::Unknown
    }
}

/// Classify using the MIME type when it is informative, otherwise the URL
pub fn classify_media(url: &str, mime_type: Option<&str>) -> MediaKind {
    match mime_type.map(kind_from_mime) {
        Some(kind) if kind != MediaKind::Unknown => kind,
        _ => kind_from_url(url),
    }
}
