//! Raw `<video>`, `<audio>` and `<source>` elements

use crate::error::SiftError;
use crate::media::candidate::{MediaSourceCandidate, Provenance};
use crate::media::page::PageSession;
use crate::media::probes::{candidates_from_value, MediaProbe, ProbeOutcome, RawSource};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

const DOM_SCRIPT: &str = r#"(() => {
    const out = [];
    document.querySelectorAll('video, audio, source').forEach(el => {
        const type = el.getAttribute('type');
        [el.currentSrc, el.getAttribute('src'), el.getAttribute('data-src')]
            .filter(Boolean)
            .forEach(url => out.push({ url, type }));
    });
    return out;
})()"#;

static MEDIA_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(?:video|audio|source)\b([^>]*)>"#).expect("media tag regex is valid")
});

static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|data-src|type)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute regex is valid")
});

/// Media elements in the rendered DOM; blob URLs are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct DomProbe;

impl DomProbe {
    pub fn script() -> &'static str {
        DOM_SCRIPT
    }
}

#[async_trait]
impl MediaProbe for DomProbe {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Dom
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError> {
        let value = page.evaluate(DOM_SCRIPT).await?;
        Ok(ProbeOutcome::from_candidates(candidates_from_value(
            value,
            Provenance::Dom,
            page_url,
        )))
    }
}

/// Scan raw HTML for media elements without a browser
pub fn scan_html_media(html: &str, page_url: Option<&str>) -> Vec<MediaSourceCandidate> {
    let mut candidates: Vec<MediaSourceCandidate> = Vec::new();
    for tag in MEDIA_TAG_REGEX.captures_iter(html) {
        let mut mime_type = None;
        let mut urls = Vec::new();
        for attribute in ATTRIBUTE_REGEX.captures_iter(&tag[1]) {
            let value = attribute
                .get(2)
                .or_else(|| attribute.get(3))
                .or_else(|| attribute.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if attribute[1].eq_ignore_ascii_case("type") {
                mime_type = Some(value);
            } else {
                urls.push(value);
            }
        }
        for url in urls {
            let raw = RawSource {
                url: Some(url),
                mime_type: mime_type.clone(),
                label: None,
            };
            if let Some(candidate) = raw.into_candidate(Provenance::Dom, page_url) {
                if !candidates.iter().any(|c| c.url == candidate.url) {
                    candidates.push(candidate);
                }
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::candidate::MediaKind;
    use crate::media::probes::testing::FakePage;
    use serde_json::json;

    #[tokio::test]
    async fn test_dom_probe_drops_blob_urls() {
        let page = FakePage::new().respond(
            "querySelectorAll('video, audio, source')",
            json!([
                {"url": "blob:https://site.example/5d2e-11", "type": null},
                {"url": "https://cdn.example.com/v/480.mp4", "type": "video/mp4"},
                {"url": "/audio/track.mp3", "type": null}
            ]),
        );
        let outcome = DomProbe
            .probe(&page, Some("https://site.example/watch"))
            .await
            .unwrap();
        let urls: Vec<&str> = outcome.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://cdn.example.com/v/480.mp4", "https://site.example/audio/track.mp3"]
        );
        assert!(outcome.candidates.iter().all(|c| c.source_tag == Provenance::Dom));
    }

    #[tokio::test]
    async fn test_dom_probe_propagates_page_errors() {
        let page = FakePage::new().fail("querySelectorAll('video, audio, source')");
        assert!(DomProbe.probe(&page, None).await.is_err());
    }

    #[test]
    fn test_scan_html_media() {
        let html = r#"
            <video id="main" src="blob:https://site.example/aa" poster="/p.jpg">
              <source src="/hls/index.m3u8" type="application/x-mpegURL">
              <source data-src='//cdn.example.com/v/720.mp4' type=video/mp4>
            </video>
            <audio SRC=https://cdn.example.com/a/theme.ogg></audio>
            <img src="/not-media.png">
        "#;
        let candidates = scan_html_media(html, Some("https://site.example/watch/3"));
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://site.example/hls/index.m3u8",
                "https://cdn.example.com/v/720.mp4",
                "https://cdn.example.com/a/theme.ogg",
            ]
        );
        assert_eq!(candidates[0].media_kind, MediaKind::Manifest);
        assert_eq!(candidates[1].media_kind, MediaKind::Primary);
    }
}
