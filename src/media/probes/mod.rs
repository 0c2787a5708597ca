//! Detectors that look for media sources in a live page
//!
//! Every detector implements [`MediaProbe`]; the scanner runs them in
//! priority order and feeds their output to the aggregator. Adding a
//! player framework means adding a row to the table in [`players`], not
//! touching the scanner.

pub mod dom;
pub mod globals;
pub mod network;
pub mod players;
pub mod scripts;

use crate::config::SiftConfig;
use crate::error::SiftError;
use crate::media::candidate::{MediaSourceCandidate, PlayerState, Provenance};
use crate::media::page::PageSession;
use crate::utils::url::{is_ephemeral_url, normalize_media_url};
use async_trait::async_trait;
use serde::Deserialize;

pub use dom::DomProbe;
pub use globals::GlobalsProbe;
pub use network::NetworkProbe;
pub use players::{NativeVideoProbe, PlayerFramework, PlayerFrameworkProbe, PLAYER_FRAMEWORKS};
pub use scripts::ScriptProbe;

/// A recognised player framework and what it reported about itself
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDetection {
    pub player_type: String,
    pub state: Option<PlayerState>,
    pub raw_config: Option<serde_json::Value>,
}

/// What one detector contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeOutcome {
    pub candidates: Vec<MediaSourceCandidate>,
    pub player: Option<PlayerDetection>,
}

impl ProbeOutcome {
    pub fn from_candidates(candidates: Vec<MediaSourceCandidate>) -> Self {
        Self {
            candidates,
            player: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.player.is_none()
    }
}

/// A detector that inspects a page and reports candidates
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Short name shown in detector reports
    fn name(&self) -> &'static str;

    /// Provenance of the candidates this detector reports
    fn provenance(&self) -> Provenance;

    /// Fallback detectors only run when nothing else found a source or a player
    fn is_fallback(&self) -> bool {
        false
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError>;
}

/// The standard detector table, highest priority first
pub fn default_probes(config: &SiftConfig) -> Vec<Box<dyn MediaProbe>> {
    vec![
        Box::new(PlayerFrameworkProbe::new()),
        Box::new(DomProbe),
        Box::new(ScriptProbe::from_config(config)),
        Box::new(NetworkProbe),
        Box::new(GlobalsProbe::from_config(config)),
        Box::new(NativeVideoProbe),
    ]
}

/// Source entry as reported by page-side scripts
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawSource {
    #[serde(default, alias = "src", alias = "file")]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub label: Option<serde_json::Value>,
}

impl RawSource {
    /// Normalise into a candidate, dropping blob/data URLs and anything unparseable
    pub fn into_candidate(
        self,
        provenance: Provenance,
        page_url: Option<&str>,
    ) -> Option<MediaSourceCandidate> {
        let raw = self.url?;
        if is_ephemeral_url(&raw) {
            return None;
        }
        let url = normalize_media_url(&raw, page_url)?;
        let mut candidate =
            MediaSourceCandidate::new(url, provenance).with_mime(self.mime_type.as_deref());
        if let Some(label) = self.label.as_ref().and_then(label_text) {
            candidate = candidate.with_quality_label(label);
        }
        Some(candidate)
    }
}

fn label_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Parse a JSON array of sources into candidates, skipping malformed entries
pub(crate) fn candidates_from_value(
    value: serde_json::Value,
    provenance: Provenance,
    page_url: Option<&str>,
) -> Vec<MediaSourceCandidate> {
    let serde_json::Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawSource>(item).ok())
        .filter_map(|source| source.into_candidate(provenance, page_url))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory page used by detector and scanner tests

    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers scripts by substring match, in insertion order
    #[derive(Default)]
    pub struct FakePage {
        pub url: Option<String>,
        responses: Vec<(&'static str, serde_json::Value)>,
        delays: Vec<(&'static str, Duration)>,
        failures: Vec<&'static str>,
        pub evaluated: Mutex<Vec<String>>,
    }

    impl FakePage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_url(mut self, url: &str) -> Self {
            self.url = Some(url.to_string());
            self
        }

        pub fn respond(mut self, marker: &'static str, value: serde_json::Value) -> Self {
            self.responses.push((marker, value));
            self
        }

        pub fn delay(mut self, marker: &'static str, delay: Duration) -> Self {
            self.delays.push((marker, delay));
            self
        }

        pub fn fail(mut self, marker: &'static str) -> Self {
            self.failures.push(marker);
            self
        }

        pub fn evaluated_count(&self, marker: &str) -> usize {
            self.evaluated
                .lock()
                .unwrap()
                .iter()
                .filter(|script| script.contains(marker))
                .count()
        }
    }

    #[async_trait]
    impl PageSession for FakePage {
        async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SiftError> {
            self.evaluated.lock().unwrap().push(script.to_string());
            if let Some((_, delay)) = self.delays.iter().find(|(m, _)| script.contains(m)) {
                tokio::time::sleep(*delay).await;
            }
            if self.failures.iter().any(|m| script.contains(m)) {
                return Err(SiftError::PageEvaluation("execution context was destroyed".into()));
            }
            Ok(self
                .responses
                .iter()
                .find(|(m, _)| script.contains(m))
                .map(|(_, value)| value.clone())
                .unwrap_or(serde_json::Value::Null))
        }

        fn page_url(&self) -> Option<String> {
            self.url.clone()
        }
    }
}
