//! Merging of detector output into one deduplicated source list

use crate::media::candidate::{MediaSourceCandidate, PlayerState, Provenance};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// How a detector run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    /// Ran and contributed at least one source or a player
    Ok,
    /// Ran and found nothing
    Empty,
    TimedOut,
    Failed,
    /// Never ran, the scan deadline had passed or the detector did not apply
    Skipped,
}

/// Diagnostic record of one detector run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorReport {
    pub name: String,
    pub provenance: Provenance,
    pub status: DetectorStatus,
    /// Candidates the detector returned, before deduplication
    pub found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl DetectorReport {
    pub fn new(name: impl Into<String>, provenance: Provenance, status: DetectorStatus) -> Self {
        Self {
            name: name.into(),
            provenance,
            status,
            found: 0,
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn with_found(mut self, found: usize) -> Self {
        self.found = found;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }
}

/// Source totals, overall and per detector family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCounts {
    pub total: usize,
    pub by_provenance: BTreeMap<Provenance, usize>,
}

/// Final output of an aggregation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// A player was recognised, or at least one source was collected
    pub success: bool,
    pub player_type_detected: Option<String>,
    pub sources: Vec<MediaSourceCandidate>,
    pub player_state: Option<PlayerState>,
    pub raw_config: Option<serde_json::Value>,
    pub counts: SourceCounts,
    pub detectors: Vec<DetectorReport>,
    /// A detector timed out, or the scan deadline skipped some
    pub partial: bool,
}

impl AggregateResult {
    /// URLs of all sources, in result order
    pub fn urls(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.url.as_str()).collect()
    }

    /// Sources reported by one detector family
    pub fn by_provenance(
        &self,
        provenance: Provenance,
    ) -> impl Iterator<Item = &MediaSourceCandidate> {
        self.sources
            .iter()
            .filter(move |source| source.source_tag == provenance)
    }
}

/// Collects candidates from any number of detectors
///
/// The aggregator never runs detectors itself. One entry is kept per
/// distinct URL; when two detectors report the same URL the entry carries
/// the provenance of the higher-priority detector, whatever order they were
/// fed in. Only the first recognised player framework is recorded.
#[derive(Debug, Default)]
pub struct MediaSourceAggregator {
    sources: Vec<MediaSourceCandidate>,
    index: HashMap<String, usize>,
    player_type: Option<String>,
    player_state: Option<PlayerState>,
    raw_config: Option<serde_json::Value>,
    detectors: Vec<DetectorReport>,
    partial: bool,
}

impl MediaSourceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one candidate, returns `true` if its URL was not seen before
    pub fn add(&mut self, candidate: MediaSourceCandidate) -> bool {
        let Some(&position) = self.index.get(&candidate.url) else {
            self.index.insert(candidate.url.clone(), self.sources.len());
            self.sources.push(candidate);
            return true;
        };

        let existing = &mut self.sources[position];
        if candidate.source_tag.outranks(existing.source_tag) {
            debug!(
                "{} takes over {} from {}",
                candidate.source_tag, candidate.url, existing.source_tag
            );
            let previous = std::mem::replace(existing, candidate);
            absorb_details(existing, previous);
        } else {
            absorb_details(existing, candidate);
        }
        false
    }

    /// Add many candidates, returns how many were new
    pub fn extend(&mut self, candidates: impl IntoIterator<Item = MediaSourceCandidate>) -> usize {
        candidates
            .into_iter()
            .map(|candidate| self.add(candidate))
            .filter(|added| *added)
            .count()
    }

    /// Record the recognised player framework; later frameworks are ignored
    pub fn set_player(
        &mut self,
        player_type: impl Into<String>,
        state: Option<PlayerState>,
        raw_config: Option<serde_json::Value>,
    ) -> bool {
        let player_type = player_type.into();
        if let Some(current) = &self.player_type {
            debug!("Ignoring player {} after {}", player_type, current);
            return false;
        }
        self.player_type = Some(player_type);
        self.player_state = state;
        self.raw_config = raw_config;
        true
    }

    /// Record how a detector run went
    pub fn record(&mut self, report: DetectorReport) {
        self.detectors.push(report);
    }

    /// Flag the result as incomplete
    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    pub fn player_type(&self) -> Option<&str> {
        self.player_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Check whether a URL has already been collected
    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    /// Build the result, sources ordered by detector priority then arrival
    pub fn finish(self) -> AggregateResult {
        let mut sources = self.sources;
        sources.sort_by_key(|source| source.source_tag.rank());

        let mut counts = SourceCounts {
            total: sources.len(),
            ..Default::default()
        };
        for source in &sources {
            *counts.by_provenance.entry(source.source_tag).or_insert(0) += 1;
        }

        // Both signals count on their own
        let success = self.player_type.is_some() || !sources.is_empty();

        AggregateResult {
            success,
            player_type_detected: self.player_type,
            sources,
            player_state: self.player_state,
            raw_config: self.raw_config,
            counts,
            detectors: self.detectors,
            partial: self.partial,
        }
    }
}

/// Fill labels the kept entry lacks from the one being dropped
fn absorb_details(kept: &mut MediaSourceCandidate, dropped: MediaSourceCandidate) {
    if kept.quality_label.is_none() {
        kept.quality_label = dropped.quality_label;
    }
    if kept.player_type.is_none() {
        kept.player_type = dropped.player_type;
    }
}
