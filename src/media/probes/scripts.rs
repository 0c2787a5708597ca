//! Script mining: packed blocks first, then literal stream URLs in the remaining scripts

use crate::config::SiftConfig;
use crate::error::SiftError;
use crate::harvest::mining::{extract_media_assignments, extract_stream_urls, merge_unique};
use crate::harvest::packed::PackedScriptHarvester;
use crate::media::candidate::{MediaSourceCandidate, Provenance};
use crate::media::page::PageSession;
use crate::media::probes::{MediaProbe, ProbeOutcome};
use crate::utils::url::normalize_media_url;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

const DOCUMENT_SCRIPT: &str = "(() => document.documentElement ? document.documentElement.outerHTML : '')()";

static SCRIPT_BODY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").expect("script body regex is valid")
});

/// Mines the page's HTML; reports `packed_js` and `script_regex` candidates
#[derive(Debug, Clone, Default)]
pub struct ScriptProbe {
    harvester: PackedScriptHarvester,
}

impl ScriptProbe {
    pub fn from_config(config: &SiftConfig) -> Self {
        Self {
            harvester: PackedScriptHarvester::from_config(config),
        }
    }

    /// Mine a whole HTML document
    pub fn mine_document(&self, html: &str, page_url: Option<&str>) -> Vec<MediaSourceCandidate> {
        let mut candidates = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        let harvest = self.harvester.harvest(html);
        for url in harvest.stream_urls {
            if let Some(url) = normalize_media_url(&url, page_url) {
                if !seen.contains(&url) {
                    seen.push(url.clone());
                    candidates.push(MediaSourceCandidate::new(url, Provenance::PackedJs));
                }
            }
        }

        let mut plain: Vec<String> = Vec::new();
        for body in script_bodies(html) {
            // Packed spans are the harvester's; the text around them is mined as is
            let text = self.harvester.strip_blocks(body);
            merge_unique(&mut plain, extract_stream_urls(&text));
            merge_unique(&mut plain, extract_media_assignments(&text, page_url));
        }
        for url in plain {
            if let Some(url) = normalize_media_url(&url, page_url) {
                if !seen.contains(&url) {
                    seen.push(url.clone());
                    candidates.push(MediaSourceCandidate::new(url, Provenance::ScriptRegex));
                }
            }
        }

        debug!(
            "Script mining found {} candidate(s) from {} packed block(s)",
            candidates.len(),
            harvest.unpacked_scripts.len()
        );
        candidates
    }
}

/// Inline script contents, in document order
pub fn script_bodies(html: &str) -> impl Iterator<Item = &str> {
    SCRIPT_BODY_REGEX
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|body| !body.trim().is_empty())
}

#[async_trait]
impl MediaProbe for ScriptProbe {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn provenance(&self) -> Provenance {
        Provenance::ScriptRegex
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError> {
        let html = match page.evaluate(DOCUMENT_SCRIPT).await? {
            serde_json::Value::String(html) => html,
            _ => return Ok(ProbeOutcome::default()),
        };
        Ok(ProbeOutcome::from_candidates(self.mine_document(&html, page_url)))
    }
}
