//! Candidate media sources and their provenance

use crate::utils::mime::classify_media;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector family that reported a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Dom,
    Network,
    ScriptRegex,
    PlayerApi,
    PackedJs,
    WindowVar,
}

impl Provenance {
    /// All detector families, highest priority first
    pub const BY_PRIORITY: [Provenance; 6] = [
        Provenance::PlayerApi,
        Provenance::Dom,
        Provenance::PackedJs,
        Provenance::ScriptRegex,
        Provenance::Network,
        Provenance::WindowVar,
    ];

    /// Priority rank; lower wins on collision
    pub fn rank(self) -> usize {
        match self {
            Provenance::PlayerApi => 0,
            Provenance::Dom => 1,
            Provenance::PackedJs => 2,
            Provenance::ScriptRegex => 3,
            Provenance::Network => 4,
            Provenance::WindowVar => 5,
        }
    }

    /// Check whether `self` takes precedence over `other`
    pub fn outranks(self, other: Provenance) -> bool {
        self.rank() < other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Dom => "dom",
            Provenance::Network => "network",
            Provenance::ScriptRegex => "script_regex",
            Provenance::PlayerApi => "player_api",
            Provenance::PackedJs => "packed_js",
            Provenance::WindowVar => "window_var",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a candidate URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// The main progressive source
    Primary,
    /// An alternative rendition offered by a player's quality menu
    QualityVariant,
    /// HLS or DASH manifest
    Manifest,
    Segment,
    #[default]
    Unknown,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Primary => "primary",
            MediaKind::QualityVariant => "quality_variant",
            MediaKind::Manifest => "manifest",
            MediaKind::Segment => "segment",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single candidate playable URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSourceCandidate {
    pub url: String,
    pub source_tag: Provenance,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_type: Option<String>,
}

impl MediaSourceCandidate {
    /// Create a candidate, classifying its kind from the URL
    pub fn new(url: impl Into<String>, source_tag: Provenance) -> Self {
        let url = url.into();
        let media_kind = classify_media(&url, None);
        Self {
            url,
            source_tag,
            media_kind,
            quality_label: None,
            player_type: None,
        }
    }

    /// Reclassify using a MIME type when one is known
    pub fn with_mime(mut self, mime_type: Option<&str>) -> Self {
        self.media_kind = classify_media(&self.url, mime_type);
        self
    }

    pub fn with_kind(mut self, media_kind: MediaKind) -> Self {
        self.media_kind = media_kind;
        self
    }

    pub fn with_quality_label(mut self, label: impl Into<String>) -> Self {
        self.quality_label = Some(label.into());
        self
    }

    pub fn with_player_type(mut self, player_type: impl Into<String>) -> Self {
        self.player_type = Some(player_type.into());
        self
    }
}

/// Playback state reported by a recognised player framework
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub is_playing: bool,
    pub current_time_seconds: f64,
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let ranks: Vec<usize> = Provenance::BY_PRIORITY.iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);
        assert!(Provenance::PlayerApi.outranks(Provenance::Dom));
        assert!(Provenance::PackedJs.outranks(Provenance::ScriptRegex));
        assert!(!Provenance::WindowVar.outranks(Provenance::Network));
    }

    #[test]
    fn test_candidate_serialization() {
        let candidate = MediaSourceCandidate::new(
            "https://cdn.example.com/a/master.m3u8",
            Provenance::ScriptRegex,
        )
        .with_quality_label("720p");
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["sourceTag"], "script_regex");
        assert_eq!(json["mediaKind"], "manifest");
        assert_eq!(json["qualityLabel"], "720p");
        assert!(json.get("playerType").is_none());
    }

    #[test]
    fn test_with_mime_overrides_url_guess() {
        let candidate =
            MediaSourceCandidate::new("https://cdn.example.com/play?id=7", Provenance::Dom);
        assert_eq!(candidate.media_kind, MediaKind::Unknown);
        let candidate = candidate.with_mime(Some("application/x-mpegURL"));
        assert_eq!(candidate.media_kind, MediaKind::Manifest);
    }

    #[test]
    fn test_player_state_from_json() {
        let state: PlayerState = serde_json::from_str(
            r#"{"isPlaying":true,"currentTimeSeconds":12.5,"durationSeconds":600}"#,
        )
        .unwrap();
        assert!(state.is_playing);
        assert_eq!(state.duration_seconds, 600.0);
    }
}
