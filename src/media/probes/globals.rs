//! Probing of conventional `window` globals for embedded sources

use crate::config::SiftConfig;
use crate::error::SiftError;
use crate::harvest::mining::is_stream_url;
use crate::media::candidate::{MediaSourceCandidate, Provenance};
use crate::media::page::PageSession;
use crate::media::probes::{MediaProbe, ProbeOutcome};
use crate::utils::url::normalize_media_url;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Global names sites commonly park player configuration under
pub const DEFAULT_GLOBAL_NAMES: &[&str] = &[
    "sources",
    "videoSources",
    "videoUrl",
    "video_url",
    "videoSrc",
    "streamUrl",
    "hlsUrl",
    "mediaUrl",
    "file",
    "playerConfig",
    "player_config",
    "jwConfig",
    "flashvars",
    "videoData",
    "__INITIAL_STATE__",
    "__NEXT_DATA__",
];

const LABEL_KEYS: &[&str] = &["label", "quality", "res", "resolution"];

/// Reads an allow-list of globals and walks them for stream URLs
#[derive(Debug, Clone)]
pub struct GlobalsProbe {
    names: Vec<String>,
    max_depth: usize,
}

impl Default for GlobalsProbe {
    fn default() -> Self {
        Self::from_config(&SiftConfig::default())
    }
}

impl GlobalsProbe {
    pub fn from_config(config: &SiftConfig) -> Self {
        Self {
            names: DEFAULT_GLOBAL_NAMES.iter().map(|name| name.to_string()).collect(),
            max_depth: config.max_global_depth,
        }
    }

    /// Replace the allow-list
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Page script that serialises every allow-listed global, dropping functions and cycles
    pub fn script(&self) -> String {
        let names = serde_json::to_string(&self.names).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"(() => {{
    const out = {{}};
    {names}.forEach(name => {{
        try {{
            const value = window[name];
            if (value === undefined || value === null) return;
            const seen = new WeakSet();
            out[name] = JSON.parse(JSON.stringify(value, (k, v) => {{
                if (typeof v === 'function') return undefined;
                if (typeof v === 'object' && v !== null) {{
                    if (seen.has(v)) return undefined;
                    seen.add(v);
                }}
                return v;
            }}));
        }} catch (e) {{}}
    }});
    return out;
}})()"#
        )
    }

    /// Collect stream URLs from the serialised globals
    pub fn collect(&self, globals: &Value, page_url: Option<&str>) -> Vec<MediaSourceCandidate> {
        let mut found: Vec<(String, Option<String>)> = Vec::new();
        if let Value::Object(map) = globals {
            for name in &self.names {
                if let Some(value) = map.get(name) {
                    walk(value, 0, self.max_depth, None, page_url, &mut found);
                }
            }
        }

        let mut candidates: Vec<MediaSourceCandidate> = Vec::new();
        for (url, label) in found {
            if candidates.iter().any(|c| c.url == url) {
                continue;
            }
            let mut candidate = MediaSourceCandidate::new(url, Provenance::WindowVar);
            if let Some(label) = label {
                candidate = candidate.with_quality_label(label);
            }
            candidates.push(candidate);
        }
        candidates
    }
}

fn walk(
    value: &Value,
    depth: usize,
    max_depth: usize,
    label: Option<&str>,
    page_url: Option<&str>,
    found: &mut Vec<(String, Option<String>)>,
) {
    if depth > max_depth {
        return;
    }
    match value {
        Value::String(text) => {
            if let Some(url) = url_from_text(text, page_url) {
                found.push((url, label.map(str::to_string)));
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, max_depth, None, page_url, found);
            }
        }
        Value::Object(map) => {
            let label = object_label(map);
            for child in map.values() {
                walk(child, depth + 1, max_depth, label.as_deref(), page_url, found);
            }
        }
        _ => {}
    }
}

fn object_label(map: &Map<String, Value>) -> Option<String> {
    LABEL_KEYS.iter().find_map(|key| match map.get(*key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn url_from_text(text: &str, page_url: Option<&str>) -> Option<String> {
    let trimmed = text.trim();
    let url_like =
        trimmed.starts_with("http") || trimmed.starts_with("//") || trimmed.starts_with('/');
    if !url_like {
        return None;
    }
    normalize_media_url(trimmed, page_url).filter(|url| is_stream_url(url))
}

#[async_trait]
impl MediaProbe for GlobalsProbe {
    fn name(&self) -> &'static str {
        "window_var"
    }

    fn provenance(&self) -> Provenance {
        Provenance::WindowVar
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError> {
        let globals = page.evaluate(&self.script()).await?;
        Ok(ProbeOutcome::from_candidates(self.collect(&globals, page_url)))
    }
}
