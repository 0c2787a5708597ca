//! Player framework introspection
//!
//! Frameworks are rows in [`PLAYER_FRAMEWORKS`]. Each row carries a page
//! script that returns `null` when the framework's runtime object is absent,
//! or an object of the shape
//!
//! ```json
//! { "sources": [{ "url": "...", "type": "...", "label": "720p" }],
//!   "state": { "isPlaying": true, "currentTimeSeconds": 1.5, "durationSeconds": 60 },
//!   "config": { } }
//! ```
//!
//! The first framework that answers wins; lower rows are not consulted.

use crate::error::SiftError;
use crate::media::candidate::{MediaKind, MediaSourceCandidate, PlayerState, Provenance};
use crate::media::page::PageSession;
use crate::media::probes::{MediaProbe, PlayerDetection, ProbeOutcome, RawSource};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const STATE_HELPER: &str = "const state = (v) => v ? ({ isPlaying: !v.paused && !v.ended, currentTimeSeconds: v.currentTime || 0, durationSeconds: isFinite(v.duration) ? v.duration : 0 }) : null; const firstVideo = () => document.querySelector('video');";

/// One player framework the introspection probe knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerFramework {
    pub name: &'static str,
    /// Substring whose presence in raw HTML hints that the framework is loaded
    pub html_marker: &'static str,
    /// Page-side function body; returns `null` or the normalised report
    pub body: &'static str,
}

impl PlayerFramework {
    /// Self-contained expression to evaluate in the page
    pub fn script(&self) -> String {
        wrap_script(self.body)
    }

    /// Check raw HTML for the framework's loader or setup call
    pub fn appears_in(&self, html: &str) -> bool {
        html.contains(self.html_marker)
    }
}

fn wrap_script(body: &str) -> String {
    format!(
        "(() => {{ try {{ {} {} }} catch (e) {{ return null; }} }})()",
        STATE_HELPER, body
    )
}

/// Known frameworks, highest priority first
pub const PLAYER_FRAMEWORKS: &[PlayerFramework] = &[
    PlayerFramework {
        name: "jwplayer",
        html_marker: "jwplayer(",
        body: r#"
            if (typeof window.jwplayer !== 'function') return null;
            const p = window.jwplayer();
            if (!p || typeof p.getPlaylistItem !== 'function') return null;
            const item = p.getPlaylistItem() || {};
            const sources = (item.sources || []).map(s => ({ url: s.file, type: s.type, label: s.label }));
            if (item.file) sources.unshift({ url: item.file, type: item.type });
            return {
                sources,
                state: { isPlaying: p.getState() === 'playing', currentTimeSeconds: p.getPosition() || 0, durationSeconds: p.getDuration() || 0 },
                config: p.getConfig ? { playlist: p.getConfig().playlist || null } : null
            };
        "#,
    },
    PlayerFramework {
        name: "videojs",
        html_marker: "videojs(",
        body: r#"
            if (typeof window.videojs !== 'function' || !window.videojs.getPlayers) return null;
            const players = window.videojs.getPlayers();
            const p = Object.keys(players).map(k => players[k]).find(Boolean);
            if (!p) return null;
            const sources = (p.currentSources ? p.currentSources() : []).map(s => ({ url: s.src, type: s.type, label: s.label }));
            if (p.currentSrc && p.currentSrc()) sources.unshift({ url: p.currentSrc(), type: p.currentType ? p.currentType() : null });
            return {
                sources,
                state: { isPlaying: !p.paused(), currentTimeSeconds: p.currentTime() || 0, durationSeconds: p.duration() || 0 },
                config: p.options_ ? { sources: p.options_.sources || null } : null
            };
        "#,
    },
    PlayerFramework {
        name: "plyr",
        html_marker: "new Plyr(",
        body: r#"
            if (typeof window.Plyr !== 'function') return null;
            const p = [window.player, window.plyr].find(x => x && x.elements && typeof x.play === 'function');
            const media = p ? p.media : (document.querySelector('.plyr video') || null);
            if (!media) return null;
            const sources = [{ url: p ? p.source : media.currentSrc }];
            media.querySelectorAll('source').forEach(s => sources.push({ url: s.src, type: s.type, label: s.getAttribute('size') }));
            return { sources, state: state(media), config: null };
        "#,
    },
    PlayerFramework {
        name: "flowplayer",
        html_marker: "flowplayer(",
        body: r#"
            if (typeof window.flowplayer !== 'function') return null;
            const p = window.flowplayer();
            if (!p) return null;
            const video = p.video || {};
            const sources = (video.sources || []).map(s => ({ url: s.src, type: s.type }));
            if (video.src) sources.unshift({ url: video.src, type: video.type });
            return {
                sources,
                state: { isPlaying: !!p.playing, currentTimeSeconds: video.time || 0, durationSeconds: video.duration || 0 },
                config: p.conf || null
            };
        "#,
    },
    PlayerFramework {
        name: "clappr",
        html_marker: "Clappr.Player",
        body: r#"
            if (!window.Clappr) return null;
            const p = [window.player, window.clapprPlayer].find(x => x && x.options && typeof x.getCurrentTime === 'function');
            if (!p) return null;
            const source = p.options.source || (p.options.sources || [])[0];
            const sources = (p.options.sources || []).map(s => ({ url: typeof s === 'string' ? s : s.source, type: s.mimeType }));
            if (source) sources.unshift({ url: typeof source === 'string' ? source : source.source });
            return {
                sources,
                state: { isPlaying: p.isPlaying(), currentTimeSeconds: p.getCurrentTime() || 0, durationSeconds: p.getDuration() || 0 },
                config: null
            };
        "#,
    },
    PlayerFramework {
        name: "shaka",
        html_marker: "shaka.Player",
        body: r#"
            if (!window.shaka || !window.shaka.Player) return null;
            const p = [window.player, window.shakaPlayer].find(x => x && typeof x.getAssetUri === 'function');
            if (!p) return null;
            const tracks = p.getVariantTracks ? p.getVariantTracks() : [];
            const sources = [{ url: p.getAssetUri() }];
            return {
                sources,
                state: state(p.getMediaElement ? p.getMediaElement() : firstVideo()),
                config: { variants: tracks.map(t => ({ height: t.height, bandwidth: t.bandwidth })) }
            };
        "#,
    },
    PlayerFramework {
        name: "hlsjs",
        html_marker: "new Hls(",
        body: r#"
            if (typeof window.Hls !== 'function') return null;
            const p = [window.hls, window.player].find(x => x && typeof x.loadSource === 'function');
            if (!p) return null;
            const levels = (p.levels || []).map(l => ({ url: l.url && l.url[0] ? l.url[0] : l.uri, label: l.height ? l.height + 'p' : null }));
            return { sources: [{ url: p.url, type: 'application/x-mpegURL' }].concat(levels), state: state(p.media || firstVideo()), config: null };
        "#,
    },
    PlayerFramework {
        name: "dashjs",
        html_marker: "dashjs.MediaPlayer",
        body: r#"
            if (!window.dashjs) return null;
            const p = [window.player, window.dashPlayer].find(x => x && typeof x.getSource === 'function');
            if (!p) return null;
            const source = p.getSource();
            return {
                sources: [{ url: typeof source === 'string' ? source : null, type: 'application/dash+xml' }],
                state: state(p.getVideoElement ? p.getVideoElement() : firstVideo()),
                config: null
            };
        "#,
    },
    PlayerFramework {
        name: "mediaelement",
        html_marker: "MediaElementPlayer",
        body: r#"
            if (!window.mejs || !window.mejs.players) return null;
            const p = Object.values(window.mejs.players)[0];
            if (!p || !p.media) return null;
            return { sources: [{ url: p.media.getSrc ? p.media.getSrc() : p.media.src }], state: state(p.media), config: null };
        "#,
    },
];

const NATIVE_VIDEO_BODY: &str = r#"
    const v = firstVideo();
    if (!v) return null;
    const sources = [{ url: v.currentSrc }, { url: v.getAttribute('src') }];
    v.querySelectorAll('source').forEach(s => sources.push({ url: s.src, type: s.type }));
    return { sources, state: state(v), config: null };
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerReport {
    #[serde(default)]
    sources: Vec<serde_json::Value>,
    #[serde(default)]
    state: Option<PlayerState>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

/// Turn a framework's report into a player detection plus candidates
///
/// The first usable source is the framework's current one; later
/// progressive sources are quality variants.
fn parse_report(
    player_type: &str,
    value: serde_json::Value,
    page_url: Option<&str>,
) -> Option<ProbeOutcome> {
    if value.is_null() {
        return None;
    }
    let report: PlayerReport = match serde_json::from_value(value) {
        Ok(report) => report,
        Err(e) => {
            debug!("Unreadable {} report: {}", player_type, e);
            return None;
        }
    };

    let mut candidates: Vec<MediaSourceCandidate> = Vec::new();
    for source in report.sources {
        let Ok(raw) = serde_json::from_value::<RawSource>(source) else {
            continue;
        };
        let Some(candidate) = raw.into_candidate(Provenance::PlayerApi, page_url) else {
            continue;
        };
        if candidates.iter().any(|c| c.url == candidate.url) {
            continue;
        }
        let kind = match candidate.media_kind {
            MediaKind::Primary | MediaKind::Unknown if candidates.is_empty() => MediaKind::Primary,
            MediaKind::Primary | MediaKind::Unknown => MediaKind::QualityVariant,
            other => other,
        };
        candidates.push(candidate.with_kind(kind).with_player_type(player_type));
    }

    Some(ProbeOutcome {
        candidates,
        player: Some(PlayerDetection {
            player_type: player_type.to_string(),
            state: report.state,
            raw_config: report.config.filter(|config| !config.is_null()),
        }),
    })
}

/// Probes the framework table in order and stops at the first framework present
#[derive(Debug, Clone)]
pub struct PlayerFrameworkProbe {
    frameworks: Vec<PlayerFramework>,
}

impl Default for PlayerFrameworkProbe {
    fn default() -> Self {
        Self::with_frameworks(PLAYER_FRAMEWORKS.to_vec())
    }
}

impl PlayerFrameworkProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom framework table, highest priority first
    pub fn with_frameworks(frameworks: Vec<PlayerFramework>) -> Self {
        Self { frameworks }
    }

    pub fn frameworks(&self) -> &[PlayerFramework] {
        &self.frameworks
    }

    /// First framework whose marker appears in raw HTML
    pub fn detect_in_html(&self, html: &str) -> Option<&PlayerFramework> {
        self.frameworks.iter().find(|framework| framework.appears_in(html))
    }
}

#[async_trait]
impl MediaProbe for PlayerFrameworkProbe {
    fn name(&self) -> &'static str {
        "player_api"
    }

    fn provenance(&self) -> Provenance {
        Provenance::PlayerApi
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError> {
        for framework in &self.frameworks {
            let value = match page.evaluate(&framework.script()).await {
                Ok(value) => value,
                Err(e) if e.is_detector_soft() => {
                    debug!("{} probe failed: {}", framework.name, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(outcome) = parse_report(framework.name, value, page_url) {
                debug!(
                    "Detected {} with {} source(s)",
                    framework.name,
                    outcome.candidates.len()
                );
                return Ok(outcome);
            }
        }
        Ok(ProbeOutcome::default())
    }
}

/// Plain `<video>` element, consulted only when every other detector came back empty
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeVideoProbe;

impl NativeVideoProbe {
    pub const PLAYER_TYPE: &'static str = "html5";

    pub fn script() -> String {
        wrap_script(NATIVE_VIDEO_BODY)
    }
}

#[async_trait]
impl MediaProbe for NativeVideoProbe {
    fn name(&self) -> &'static str {
        "native_video"
    }

    fn provenance(&self) -> Provenance {
        Provenance::PlayerApi
    }

    fn is_fallback(&self) -> bool {
        true
    }

    async fn probe(
        &self,
        page: &dyn PageSession,
        page_url: Option<&str>,
    ) -> Result<ProbeOutcome, SiftError> {
        let value = page.evaluate(&Self::script()).await?;
        Ok(parse_report(Self::PLAYER_TYPE, value, page_url).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::probes::testing::FakePage;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_framework_short_circuits() {
        let page = FakePage::new()
            .respond(
                "window.videojs",
                json!({
                    "sources": [
                        {"url": "https://cdn.example.com/v/master.m3u8", "type": "application/x-mpegURL"},
                        {"url": "https://cdn.example.com/v/1080.mp4", "label": "1080p"}
                    ],
                    "state": {"isPlaying": false, "currentTimeSeconds": 0, "durationSeconds": 300}
                }),
            )
            .respond(
                "window.flowplayer",
                json!({"sources": [{"url": "https://other.example/v.mp4"}]}),
            );

        let outcome = PlayerFrameworkProbe::new()
            .probe(&page, None)
            .await
            .unwrap();
        let player = outcome.player.unwrap();
        assert_eq!(player.player_type, "videojs");
        assert_eq!(player.state.unwrap().duration_seconds, 300.0);
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].media_kind, MediaKind::Manifest);
        assert_eq!(outcome.candidates[1].media_kind, MediaKind::QualityVariant);
        assert_eq!(outcome.candidates[1].quality_label.as_deref(), Some("1080p"));
        assert_eq!(page.evaluated_count("window.flowplayer"), 0);
        assert_eq!(page.evaluated_count("window.jwplayer"), 1);
    }

    #[tokio::test]
    async fn test_player_without_sources_is_still_detected() {
        let page = FakePage::new().respond(
            "window.jwplayer",
            json!({"sources": [{"url": "blob:https://site.example/1"}], "state": null}),
        );
        let outcome = PlayerFrameworkProbe::new()
            .probe(&page, None)
            .await
            .unwrap();
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.player.unwrap().player_type, "jwplayer");
    }

    #[tokio::test]
    async fn test_evaluation_errors_skip_framework() {
        let page = FakePage::new().fail("window.jwplayer").respond(
            "window.Plyr",
            json!({"sources": [{"url": "/media/clip.mp4"}]}),
        );
        let outcome = PlayerFrameworkProbe::new()
            .probe(&page, Some("https://site.example/watch/9"))
            .await
            .unwrap();
        assert_eq!(outcome.player.unwrap().player_type, "plyr");
        assert_eq!(outcome.candidates[0].url, "https://site.example/media/clip.mp4");
        assert_eq!(outcome.candidates[0].media_kind, MediaKind::Primary);
        assert_eq!(outcome.candidates[0].source_tag, Provenance::PlayerApi);
    }

    #[tokio::test]
    async fn test_no_framework_present() {
        let outcome = PlayerFrameworkProbe::new()
            .probe(&FakePage::new(), None)
            .await
            .unwrap();
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn test_native_video_fallback() {
        let page = FakePage::new().respond(
            "v.getAttribute('src')",
            json!({
                "sources": [
                    {"url": "https://cdn.example.com/clip.webm"},
                    {"url": "https://cdn.example.com/clip.webm"},
                    {"url": null}
                ],
                "state": {"isPlaying": true, "currentTimeSeconds": 4, "durationSeconds": 20}
            }),
        );
        let probe = NativeVideoProbe;
        assert!(probe.is_fallback());
        let outcome = probe.probe(&page, None).await.unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].player_type.as_deref(), Some("html5"));
        assert!(outcome.player.unwrap().state.unwrap().is_playing);
    }

    #[test]
    fn test_detect_in_html() {
        let probe = PlayerFrameworkProbe::new();
        let html = r#"<script src="/js/video.min.js"></script><script>var p = videojs("main");</script>"#;
        assert_eq!(probe.detect_in_html(html).map(|f| f.name), Some("videojs"));
        assert!(probe.detect_in_html("<video src='a.mp4'></video>").is_none());
    }

    #[test]
    fn test_scripts_are_self_contained_expressions() {
        for framework in PLAYER_FRAMEWORKS {
            let script = framework.script();
            assert!(script.starts_with("(() => {"), "{}", framework.name);
            assert!(script.ends_with("})()"), "{}", framework.name);
        }
    }
}
