//! Runs the detector table against a page and aggregates the results

use crate::config::SiftConfig;
use crate::media::aggregator::{
    AggregateResult, DetectorReport, DetectorStatus, MediaSourceAggregator,
};
use crate::media::candidate::Provenance;
use crate::media::page::PageSession;
use crate::media::probes::dom::scan_html_media;
use crate::media::probes::{
    default_probes, MediaProbe, PlayerFrameworkProbe, ProbeOutcome, ScriptProbe,
};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOCATION_SCRIPT: &str = "(() => window.location.href)()";

/// Orchestrates detectors in priority order
///
/// Each detector gets `probe_timeout`; an optional `scan_deadline` bounds the
/// whole scan. A detector that errors or runs out of time contributes nothing
/// and the scan carries on with the rest.
pub struct Scanner {
    config: SiftConfig,
    probes: Vec<Box<dyn MediaProbe>>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(SiftConfig::default())
    }
}

impl Scanner {
    /// Create a scanner with the standard detector table
    pub fn new(config: SiftConfig) -> Self {
        let probes = default_probes(&config);
        Self { config, probes }
    }

    /// Create a scanner with a custom detector table, highest priority first
    pub fn with_probes(config: SiftConfig, probes: Vec<Box<dyn MediaProbe>>) -> Self {
        Self { config, probes }
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Names of the configured detectors, in run order
    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|probe| probe.name()).collect()
    }

    /// Scan a live page
    pub async fn scan(&self, page: &dyn PageSession) -> AggregateResult {
        self.scan_with_cancel(page, &CancellationToken::new()).await
    }

    /// Scan a live page, stopping early once `cancel` fires
    ///
    /// Whatever the finished detectors contributed is still returned, flagged
    /// as partial.
    pub async fn scan_with_cancel(
        &self,
        page: &dyn PageSession,
        cancel: &CancellationToken,
    ) -> AggregateResult {
        let started = Instant::now();
        let deadline = self.config.scan_deadline.map(|budget| started + budget);
        let mut aggregator = MediaSourceAggregator::new();
        let page_url = self.resolve_page_url(page, deadline, cancel).await;

        for probe in &self.probes {
            let now = Instant::now();
            let remaining = deadline.map(|deadline| deadline.saturating_duration_since(now));

            let skipped =
                DetectorReport::new(probe.name(), probe.provenance(), DetectorStatus::Skipped);
            if cancel.is_cancelled() {
                aggregator.record(skipped.with_error("scan cancelled"));
                aggregator.mark_partial();
                continue;
            }
            if remaining == Some(Duration::ZERO) {
                debug!("Scan deadline passed, skipping {}", probe.name());
                aggregator.record(skipped);
                aggregator.mark_partial();
                continue;
            }
            if probe.is_fallback() && (!aggregator.is_empty() || aggregator.player_type().is_some())
            {
                aggregator.record(skipped);
                continue;
            }

            let budget = self.probe_budget(remaining);
            let run = tokio::time::timeout(budget, probe.probe(page, page_url.as_deref()));
            let report = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Scan cancelled while {} was running", probe.name());
                    aggregator.mark_partial();
                    skipped.with_error("scan cancelled")
                }
                outcome = run => match outcome {
                    Ok(Ok(outcome)) => absorb(&mut aggregator, probe.as_ref(), outcome),
                    Ok(Err(e)) => {
                        warn!("Detector {} failed: {}", probe.name(), e);
                        DetectorReport::new(
                            probe.name(),
                            probe.provenance(),
                            DetectorStatus::Failed,
                        )
                        .with_error(e.to_string())
                    }
                    Err(_) => {
                        warn!("Detector {} timed out after {:?}", probe.name(), budget);
                        aggregator.mark_partial();
                        let message =
                            format!("timed out after {}", humantime::format_duration(budget));
                        DetectorReport::new(
                            probe.name(),
                            probe.provenance(),
                            DetectorStatus::TimedOut,
                        )
                        .with_error(message)
                    }
                },
            };
            aggregator.record(report.with_elapsed(now.elapsed()));
        }

        let result = aggregator.finish();
        info!(
            "Scan finished in {:?}: {} source(s), player {}",
            started.elapsed(),
            result.counts.total,
            result.player_type_detected.as_deref().unwrap_or("none")
        );
        result
    }

    /// Scan raw HTML without a browser: player markers, media elements and scripts
    pub fn scan_html(&self, html: &str, page_url: Option<&str>) -> AggregateResult {
        let mut aggregator = MediaSourceAggregator::new();

        let started = Instant::now();
        let player = PlayerFrameworkProbe::new()
            .detect_in_html(html)
            .map(|framework| framework.name);
        let status = if let Some(name) = player {
            aggregator.set_player(name, None, None);
            DetectorStatus::Ok
        } else {
            DetectorStatus::Empty
        };
        aggregator.record(
            DetectorReport::new("player_api", Provenance::PlayerApi, status)
                .with_elapsed(started.elapsed()),
        );

        let started = Instant::now();
        let media = scan_html_media(html, page_url);
        let report = outcome_report("dom", Provenance::Dom, media.len());
        aggregator.extend(media);
        aggregator.record(report.with_elapsed(started.elapsed()));

        let started = Instant::now();
        let mined = ScriptProbe::from_config(&self.config).mine_document(html, page_url);
        let report = outcome_report("scripts", Provenance::ScriptRegex, mined.len());
        aggregator.extend(mined);
        aggregator.record(report.with_elapsed(started.elapsed()));

        let result = aggregator.finish();
        info!(
            "Offline scan found {} source(s), player {}",
            result.counts.total,
            result.player_type_detected.as_deref().unwrap_or("none")
        );
        result
    }

    /// Per-detector budget, never past the scan deadline
    fn probe_budget(&self, remaining: Option<Duration>) -> Duration {
        match remaining {
            Some(remaining) => remaining.min(self.config.probe_timeout),
            None => self.config.probe_timeout,
        }
    }

    async fn resolve_page_url(
        &self,
        page: &dyn PageSession,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Option<String> {
        if let Some(url) = page.page_url() {
            return Some(url);
        }
        let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) || cancel.is_cancelled() {
            return None;
        }

        let lookup =
            tokio::time::timeout(self.probe_budget(remaining), page.evaluate(LOCATION_SCRIPT));
        let url = tokio::select! {
            _ = cancel.cancelled() => None,
            value = lookup => match value {
                Ok(Ok(serde_json::Value::String(url))) => Some(url),
                _ => None,
            },
        };
        if url.is_none() {
            debug!("Page URL unavailable, relative sources will be dropped");
        }
        url
    }
}

fn absorb(
    aggregator: &mut MediaSourceAggregator,
    probe: &dyn MediaProbe,
    outcome: ProbeOutcome,
) -> DetectorReport {
    let found = outcome.candidates.len();
    let detected_player = outcome.player.is_some();
    if let Some(player) = outcome.player {
        aggregator.set_player(player.player_type, player.state, player.raw_config);
    }
    aggregator.extend(outcome.candidates);

    let status = if found > 0 || detected_player {
        DetectorStatus::Ok
    } else {
        DetectorStatus::Empty
    };
    DetectorReport::new(probe.name(), probe.provenance(), status).with_found(found)
}

fn outcome_report(name: &str, provenance: Provenance, found: usize) -> DetectorReport {
    let status = if found > 0 {
        DetectorStatus::Ok
    } else {
        DetectorStatus::Empty
    };
    DetectorReport::new(name, provenance, status).with_found(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SiftError;
    use crate::media::candidate::MediaSourceCandidate;
    use crate::media::probes::testing::FakePage;
    use async_trait::async_trait;
    use serde_json::json;

    const SHARED: &str = "https://cdn.example.com/hls/master.m3u8";

    fn statuses(result: &AggregateResult) -> Vec<(&str, DetectorStatus)> {
        result
            .detectors
            .iter()
            .map(|report| (report.name.as_str(), report.status))
            .collect()
    }

    #[tokio::test]
    async fn test_scan_merges_detectors_by_priority() {
        let page = FakePage::new()
            .with_url("https://site.example/watch/1")
            .respond(
                "window.jwplayer",
                json!({
                    "sources": [{"url": SHARED}],
                    "state": {"isPlaying": true, "currentTimeSeconds": 10, "durationSeconds": 100},
                    "config": {"playlist": [{"file": SHARED}]}
                }),
            )
            .respond(
                "querySelectorAll('video, audio, source')",
                json!([{"url": "blob:https://site.example/x"}, {"url": "/media/backup.mp4"}]),
            )
            .respond(
                "getEntriesByType('resource')",
                json!([
                    {"name": SHARED, "initiatorType": "xmlhttprequest"},
                    {
                        "name": "https://cdn.example.com/hls/seg-001.ts",
                        "initiatorType": "xmlhttprequest"
                    }
                ]),
            );

        let result = Scanner::default().scan(&page).await;

        assert!(result.success);
        assert!(!result.partial);
        assert_eq!(result.player_type_detected.as_deref(), Some("jwplayer"));
        assert!(result.player_state.unwrap().is_playing);
        assert!(result.raw_config.is_some());
        assert_eq!(
            result.urls(),
            vec![
                SHARED,
                "https://site.example/media/backup.mp4",
                "https://cdn.example.com/hls/seg-001.ts",
            ]
        );
        assert_eq!(result.sources[0].source_tag, Provenance::PlayerApi);
        assert_eq!(result.counts.by_provenance[&Provenance::Network], 1);
        assert_eq!(
            statuses(&result),
            vec![
                ("player_api", DetectorStatus::Ok),
                ("dom", DetectorStatus::Ok),
                ("scripts", DetectorStatus::Empty),
                ("network", DetectorStatus::Ok),
                ("window_var", DetectorStatus::Empty),
                ("native_video", DetectorStatus::Skipped),
            ]
        );
    }

    #[tokio::test]
    async fn test_slow_and_failing_detectors_do_not_sink_the_scan() {
        let page = FakePage::new()
            .with_url("https://site.example/")
            .delay("getEntriesByType('resource')", Duration::from_secs(60))
            .fail("querySelectorAll('video, audio, source')")
            .respond(
                "JSON.stringify(value",
                json!({"hlsUrl": "https://cdn.example.com/live/index.m3u8"}),
            );
        let config = SiftConfig::default().with_probe_timeout(Duration::from_millis(50));

        let result = Scanner::new(config).scan(&page).await;

        assert!(result.success);
        assert!(result.partial);
        assert_eq!(result.urls(), vec!["https://cdn.example.com/live/index.m3u8"]);
        let network = result.detectors.iter().find(|r| r.name == "network").unwrap();
        assert_eq!(network.status, DetectorStatus::TimedOut);
        let dom = result.detectors.iter().find(|r| r.name == "dom").unwrap();
        assert_eq!(dom.status, DetectorStatus::Failed);
        assert!(dom.error.as_deref().unwrap().contains("execution context"));
    }

    #[tokio::test]
    async fn test_native_fallback_runs_only_when_empty() {
        let page = FakePage::new().with_url("https://site.example/").respond(
            "v.getAttribute('src')",
            json!({"sources": [{"url": "https://cdn.example.com/clip.mp4"}], "state": null}),
        );

        let result = Scanner::default().scan(&page).await;

        assert_eq!(result.player_type_detected.as_deref(), Some("html5"));
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].source_tag, Provenance::PlayerApi);
        assert_eq!(
            result.detectors.last().map(|r| (r.name.as_str(), r.status)),
            Some(("native_video", DetectorStatus::Ok))
        );
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let result = Scanner::default()
            .scan(&FakePage::new().with_url("https://site.example/"))
            .await;
        assert!(!result.success);
        assert!(result.sources.is_empty());
        assert_eq!(result.counts.total, 0);
    }

    struct StaticProbe {
        name: &'static str,
        provenance: Provenance,
        urls: Vec<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl MediaProbe for StaticProbe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn provenance(&self) -> Provenance {
            self.provenance
        }

        async fn probe(
            &self,
            _page: &dyn PageSession,
            _page_url: Option<&str>,
        ) -> Result<ProbeOutcome, SiftError> {
            tokio::time::sleep(self.delay).await;
            Ok(ProbeOutcome::from_candidates(
                self.urls
                    .iter()
                    .map(|url| MediaSourceCandidate::new(*url, self.provenance))
                    .collect(),
            ))
        }
    }

    #[tokio::test]
    async fn test_deadline_keeps_partial_results() {
        let probes: Vec<Box<dyn MediaProbe>> = vec![
            Box::new(StaticProbe {
                name: "fast",
                provenance: Provenance::Dom,
                urls: vec!["https://cdn.example.com/a.mp4"],
                delay: Duration::ZERO,
            }),
            Box::new(StaticProbe {
                name: "slow",
                provenance: Provenance::Network,
                urls: vec!["https://cdn.example.com/b.mp4"],
                delay: Duration::from_secs(60),
            }),
            Box::new(StaticProbe {
                name: "late",
                provenance: Provenance::WindowVar,
                urls: vec!["https://cdn.example.com/c.mp4"],
                delay: Duration::ZERO,
            }),
        ];
        let config = SiftConfig::default().with_scan_deadline(Duration::from_millis(100));
        let scanner = Scanner::with_probes(config, probes);
        assert_eq!(scanner.probe_names(), vec!["fast", "slow", "late"]);

        let result = scanner.scan(&FakePage::new().with_url("https://site.example/")).await;

        assert!(result.partial);
        assert_eq!(result.urls(), vec!["https://cdn.example.com/a.mp4"]);
        assert_eq!(
            statuses(&result),
            vec![
                ("fast", DetectorStatus::Ok),
                ("slow", DetectorStatus::TimedOut),
                ("late", DetectorStatus::Skipped),
            ]
        );
    }

    #[tokio::test]
    async fn test_page_url_lookup_respects_deadline() {
        let page = FakePage::new().delay("window.location.href", Duration::from_secs(60));
        let config = SiftConfig::default()
            .with_probe_timeout(Duration::from_secs(2))
            .with_scan_deadline(Duration::from_millis(100));

        let started = Instant::now();
        let result = Scanner::new(config).scan(&page).await;

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(result.partial);
        assert!(result
            .detectors
            .iter()
            .all(|report| report.status == DetectorStatus::Skipped));
    }

    #[tokio::test]
    async fn test_cancel_keeps_finished_detectors() {
        let probes: Vec<Box<dyn MediaProbe>> = vec![
            Box::new(StaticProbe {
                name: "fast",
                provenance: Provenance::Dom,
                urls: vec!["https://cdn.example.com/a.mp4"],
                delay: Duration::ZERO,
            }),
            Box::new(StaticProbe {
                name: "slow",
                provenance: Provenance::Network,
                urls: vec!["https://cdn.example.com/b.mp4"],
                delay: Duration::from_secs(60),
            }),
            Box::new(StaticProbe {
                name: "late",
                provenance: Provenance::WindowVar,
                urls: vec!["https://cdn.example.com/c.mp4"],
                delay: Duration::ZERO,
            }),
        ];
        let config = SiftConfig::default().with_probe_timeout(Duration::from_secs(120));
        let scanner = Scanner::with_probes(config, probes);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let page = FakePage::new().with_url("https://site.example/");
        let result = scanner.scan_with_cancel(&page, &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.partial);
        assert!(result.success);
        assert_eq!(result.urls(), vec!["https://cdn.example.com/a.mp4"]);
        assert_eq!(
            statuses(&result),
            vec![
                ("fast", DetectorStatus::Ok),
                ("slow", DetectorStatus::Skipped),
                ("late", DetectorStatus::Skipped),
            ]
        );
        assert_eq!(result.detectors[1].error.as_deref(), Some("scan cancelled"));
    }

    #[test]
    fn test_scan_html_offline() {
        let html = r#"<html><body>
            <video src="/v/main.mp4"></video>
            <script src="https://cdn.jsdelivr.net/npm/jwplayer.js"></script>
            <script>jwplayer("box").setup({ file: "https://cdn.example.com/v/main.m3u8" });</script>
        </body></html>"#;
        let result = Scanner::default().scan_html(html, Some("https://site.example/w"));

        assert!(result.success);
        assert_eq!(result.player_type_detected.as_deref(), Some("jwplayer"));
        assert_eq!(
            result.urls(),
            vec!["https://site.example/v/main.mp4", "https://cdn.example.com/v/main.m3u8"]
        );
        assert_eq!(result.sources[1].source_tag, Provenance::ScriptRegex);
        assert_eq!(
            statuses(&result),
            vec![
                ("player_api", DetectorStatus::Ok),
                ("dom", DetectorStatus::Ok),
                ("scripts", DetectorStatus::Ok),
            ]
        );
    }
}
