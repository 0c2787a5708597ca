//! Resource-timing scan for media requests the page already made

use crate::error::SiftError;
use crate::harvest::mining::is_stream_url;
use crate::media::candidate::{MediaSourceCandidate, Provenance};
use crate::media::page::PageSession;
use crate::media::probes::{MediaProbe, ProbeOutcome};
use crate::utils::url::is_ephemeral_url;
use async_trait::async_trait;
use serde::Deserialize;

const RESOURCE_TIMING_SCRIPT: &str = r#"(() => {
    if (!window.performance || !performance.getEntriesByType) return [];
    return performance.getEntriesByType('resource').map(e => ({ name: e.name, initiatorType: e.initiatorType }));
})()"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceEntry {
    name: String,
    #[serde(default)]
    initiator_type: Option<String>,
}

/// Stream-looking requests from `performance.getEntriesByType('resource')`
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkProbe;

impl NetworkProbe {
    /// Keep the entries that look like media, skipping static assets even when their path mentions a stream
    pub fn filter_entries<'a>(
        urls: impl IntoIterator<Item = &'a str>,
    ) -> Vec<MediaSourceCandidate> {
        let mut candidates: Vec<MediaSourceCandidate> = Vec::new();
        for url in urls {
            if is_ephemeral_url(url) || !is_stream_url(url) {
                continue;
            }
            if candidates.iter().any(|c| c.url == url) {
                continue;
            }
            candidates.push(MediaSourceCandidate::new(url, Provenance::Network));
        }
        candidates
    }
}

#[async_trait]
impl MediaProbe for NetworkProbe {
    fn name(&self) -> &'static str {
        "network"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Network
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        _page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError> {
        let value = page.evaluate(RESOURCE_TIMING_SCRIPT).await?;
        let entries: Vec<ResourceEntry> = match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        };
        // Image and stylesheet fetches are never the media itself
        let urls = entries
            .iter()
            .filter(|entry| {
                !matches!(
                    entry.initiator_type.as_deref(),
                    Some("img") | Some("css") | Some("link")
                )
            })
            .map(|entry| entry.name.as_str());
        Ok(ProbeOutcome::from_candidates(Self::filter_entries(urls)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::candidate::MediaKind;
    use crate::media::probes::testing::FakePage;
    use serde_json::json;

    #[test]
    fn test_static_assets_excluded_on_substring_collision() {
        let candidates = NetworkProbe::filter_entries(vec![
            "https://cdn.example.com/hls/720/seg-1.ts",
            "https://cdn.example.com/hls/player.js",
            "https://cdn.example.com/stream/thumb.jpg",
            "https://cdn.example.com/css/mp4-theme.css",
            "https://cdn.example.com/hls/720/index.m3u8",
            "https://cdn.example.com/hls/720/seg-1.ts",
        ]);
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/hls/720/seg-1.ts",
                "https://cdn.example.com/hls/720/index.m3u8",
            ]
        );
        assert_eq!(candidates[0].media_kind, MediaKind::Segment);
        assert_eq!(candidates[1].media_kind, MediaKind::Manifest);
    }

    #[tokio::test]
    async fn test_network_probe_reads_resource_timing() {
        let page = FakePage::new().respond(
            "getEntriesByType('resource')",
            json!([
                {"name": "https://cdn.example.com/v/1080.mp4", "initiatorType": "video"},
                {"name": "https://cdn.example.com/stream/poster", "initiatorType": "img"},
                {"name": "https://api.example.com/stream/config", "initiatorType": "fetch"},
                {"bogus": true}
            ]),
        );
        let outcome = NetworkProbe.probe(&page, None).await.unwrap();
        let urls: Vec<&str> = outcome.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://cdn.example.com/v/1080.mp4", "https://api.example.com/stream/config"]
        );
        assert!(outcome.candidates.iter().all(|c| c.source_tag == Provenance::Network));
    }

    #[test]
    fn test_network_probe_without_timing_entries() {
        let page = FakePage::new().respond("getEntriesByType('resource')", json!([]));
        let outcome = tokio_test::block_on(NetworkProbe.probe(&page, None)).unwrap();
        assert!(outcome.is_empty());
    }
}
