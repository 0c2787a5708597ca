//! Harvesting of packed scripts embedded in HTML documents

use crate::config::SiftConfig;
use crate::decode::packer;
use crate::harvest::mining::{extract_urls, is_stream_url, merge_unique};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

static BLOCK_START_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:eval\s*\(\s*)?function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*[dr]\s*\)",
    )
    .expect("block start regex is valid")
});

static BLOCK_END_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.split\(\s*['"]\|['"]\s*\)(?:\s*,\s*0\s*,\s*\{\s*\})?\s*\)\s*\)"#)
        .expect("block end regex is valid")
});

/// How packed blocks were located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HarvestStrategy {
    /// Signature through the closing `.split('|')))`
    Precise,
    /// Fixed-size window after a bare signature
    Windowed,
}

/// Output of a harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestResult {
    pub unpacked_scripts: Vec<String>,
    /// Every URL found in the unpacked scripts, first-seen order
    pub extracted_urls: Vec<String>,
    /// Subset of `extracted_urls` that look like streams
    pub stream_urls: Vec<String>,
    pub strategy: Option<HarvestStrategy>,
    /// Candidate blocks that were located, accepted or not
    pub blocks_found: usize,
}

impl HarvestResult {
    /// Whether any block unpacked successfully
    pub fn is_empty(&self) -> bool {
        self.unpacked_scripts.is_empty()
    }
}

/// Finds packer blocks in a document, unpacks them and mines the result for URLs
#[derive(Debug, Clone)]
pub struct PackedScriptHarvester {
    fallback_window: usize,
    min_unpacked_len: usize,
    min_dictionary_len: usize,
}

impl Default for PackedScriptHarvester {
    fn default() -> Self {
        Self::from_config(&SiftConfig::default())
    }
}

impl PackedScriptHarvester {
    /// Create a harvester with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a harvester from configuration
    pub fn from_config(config: &SiftConfig) -> Self {
        Self {
            fallback_window: config.fallback_window,
            min_unpacked_len: config.min_unpacked_len,
            min_dictionary_len: config.min_dictionary_len,
        }
    }

    /// Locate candidate blocks, precise spans first, windows only when that finds nothing
    pub fn locate_blocks<'a>(&self, html: &'a str) -> (Vec<&'a str>, Option<HarvestStrategy>) {
        let (ranges, strategy) = self.block_ranges(html);
        let blocks: Vec<&'a str> = ranges.into_iter().map(|range| &html[range]).collect();
        (blocks, strategy)
    }

    /// Text outside every located block, the remaining pieces joined by newlines
    pub fn strip_blocks(&self, text: &str) -> String {
        let (ranges, _) = self.block_ranges(text);
        let mut kept = Vec::new();
        let mut cursor = 0;
        for range in ranges {
            // Windows may overlap
            if range.start > cursor {
                kept.push(&text[cursor..range.start]);
            }
            cursor = cursor.max(range.end);
        }
        kept.push(&text[cursor..]);
        kept.join("\n")
    }

    fn block_ranges(&self, html: &str) -> (Vec<Range<usize>>, Option<HarvestStrategy>) {
        let precise = precise_blocks(html);
        if !precise.is_empty() {
            return (precise, Some(HarvestStrategy::Precise));
        }

        let windows: Vec<Range<usize>> = BLOCK_START_REGEX
            .find_iter(html)
            .map(|m| {
                let mut end = m.start().saturating_add(self.fallback_window).min(html.len());
                while !html.is_char_boundary(end) {
                    end -= 1;
                }
                m.start()..end
            })
            .collect();
        if windows.is_empty() {
            (windows, None)
        } else {
            debug!("No precise packer blocks, using {} window(s)", windows.len());
            (windows, Some(HarvestStrategy::Windowed))
        }
    }

    /// Run the full harvest over an HTML document
    pub fn harvest(&self, html: &str) -> HarvestResult {
        let (blocks, strategy) = self.locate_blocks(html);
        let mut result = HarvestResult {
            strategy,
            blocks_found: blocks.len(),
            ..Default::default()
        };

        for block in blocks {
            let unpacked = packer::unpack_with(block, self.min_dictionary_len);
            if unpacked == block || unpacked.chars().count() <= self.min_unpacked_len {
                debug!("Discarding packer block that did not unpack");
                continue;
            }
            merge_unique(&mut result.extracted_urls, extract_urls(&unpacked));
            result.unpacked_scripts.push(unpacked);
        }

        result.stream_urls = result
            .extracted_urls
            .iter()
            .filter(|url| is_stream_url(url))
            .cloned()
            .collect();
        debug!(
            "Harvested {} packed script(s), {} URL(s), {} stream URL(s)",
            result.unpacked_scripts.len(),
            result.extracted_urls.len(),
            result.stream_urls.len()
        );
        result
    }
}

fn precise_blocks(html: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(start) = BLOCK_START_REGEX.find_at(html, cursor) {
        match BLOCK_END_REGEX.find_at(html, start.end()) {
            Some(end) => {
                blocks.push(start.start()..end.end());
                cursor = end.end();
            }
            None => break,
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECODER: &str = "eval(function(p,a,c,k,e,d){while(c--){if(k[c]){p=p.replace(new RegExp('\\\\b'+c.toString(a)+'\\\\b','g'),k[c])}}return p}";

    const PLAYER_BODY: &str = "var player=jwplayer(\"vplayer\");player.setup({sources:[{file:\"1\"},{file:\"1/2.0\"}],hlshtml:true,primary:\"html5\",withCredentials:false});";

    fn page(script: &str) -> String {
        format!(
            "<html><head><title>Watch</title></head><body><div id=\"vplayer\"></div><script>{}</script></body></html>",
            script
        )
    }

    #[test]
    fn test_end_to_end_stream_url() {
        let script = format!(
            "{}('{}',36,3,'m3u8|https://cdn.example.com/stream|master'.split('|')))",
            DECODER, PLAYER_BODY
        );
        let result = PackedScriptHarvester::new().harvest(&page(&script));

        assert_eq!(result.strategy, Some(HarvestStrategy::Precise));
        assert_eq!(result.unpacked_scripts.len(), 1);
        assert!(result.unpacked_scripts[0].contains("jwplayer(\"vplayer\")"));
        assert_eq!(
            result.extracted_urls,
            vec![
                "https://cdn.example.com/stream".to_string(),
                "https://cdn.example.com/stream/master.m3u8".to_string(),
            ]
        );
        assert!(result
            .stream_urls
            .contains(&"https://cdn.example.com/stream".to_string()));
    }

    #[test]
    fn test_windowed_fallback_recovers_block() {
        // The trailing parentheses are cut off, so the precise span never closes
        let script = format!(
            "{}('{}',36,3,'m3u8|https://cdn.example.com/stream|master'.split('|'),0,{{}})",
            DECODER, PLAYER_BODY
        );
        let html = page(&script);
        assert!(precise_blocks(&html).is_empty());

        let result = PackedScriptHarvester::new().harvest(&html);
        assert_eq!(result.strategy, Some(HarvestStrategy::Windowed));
        assert!(!result.unpacked_scripts.is_empty());
        assert!(result
            .stream_urls
            .contains(&"https://cdn.example.com/stream/master.m3u8".to_string()));
    }

    #[test]
    fn test_multiple_blocks_dedupe_urls() {
        let first = format!(
            "{}('{}',36,3,'m3u8|https://cdn.example.com/stream|master'.split('|'),0,{{}}))",
            DECODER, PLAYER_BODY
        );
        let second_body = "var backup={file:\"0\",poster:\"1\"};document.getElementById(\"alt\").setAttribute(\"data-src\",backup.file);window.fallbackSources=[backup];";
        let second = format!(
            "{}('{}',36,2,'https://cdn.example.com/stream|https://img.example.com/poster.jpg'.split('|'),0,{{}}))",
            DECODER, second_body
        );
        let html = page(&format!("{};\n{}", first, second));

        let result = PackedScriptHarvester::new().harvest(&html);
        assert_eq!(result.blocks_found, 2);
        assert_eq!(result.unpacked_scripts.len(), 2);
        assert_eq!(
            result.extracted_urls,
            vec![
                "https://cdn.example.com/stream".to_string(),
                "https://cdn.example.com/stream/master.m3u8".to_string(),
                "https://img.example.com/poster.jpg".to_string(),
            ]
        );
        assert_eq!(result.stream_urls.len(), 2);
    }

    #[test]
    fn test_short_or_failed_unpacks_are_discarded() {
        // Unpacks fine but is far too short to be a real player script
        let short = format!("{}('0 1',36,2,'a|b'.split('|')))", DECODER);
        // Radix out of range, unpack is a no-op
        let broken = format!("{}('0 1',99,2,'a|b'.split('|')))", DECODER);
        let result = PackedScriptHarvester::new().harvest(&page(&format!("{}{}", short, broken)));

        assert_eq!(result.blocks_found, 2);
        assert!(result.is_empty());
        assert!(result.extracted_urls.is_empty());
    }

    #[test]
    fn test_no_packer_at_all() {
        let result = PackedScriptHarvester::new()
            .harvest("<script>var u='https://cdn.example.com/v.mp4'</script>");
        assert_eq!(result.strategy, None);
        assert_eq!(result.blocks_found, 0);
        assert!(result.extracted_urls.is_empty());
    }

    #[test]
    fn test_window_respects_char_boundaries() {
        let html = format!("{}('é',36,1,'x'.split('|'),0,{{}})ééééé", DECODER);
        // Three bytes past the decoder lands inside the two-byte 'é'
        let harvester = PackedScriptHarvester::from_config(
            &SiftConfig::default().with_fallback_window(DECODER.len() + 3),
        );
        let (blocks, strategy) = harvester.locate_blocks(&html);
        assert_eq!(strategy, Some(HarvestStrategy::Windowed));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], format!("{}('", DECODER));
    }

    #[test]
    fn test_huge_window_is_clamped_to_document() {
        let html = format!("{}('x',36,1,'y'.split('|'),0,{{}})", DECODER);
        let harvester = PackedScriptHarvester::from_config(
            &SiftConfig::default().with_fallback_window(usize::MAX),
        );
        let (blocks, strategy) = harvester.locate_blocks(&html);
        assert_eq!(strategy, Some(HarvestStrategy::Windowed));
        assert_eq!(blocks, vec![html.as_str()]);
        assert!(harvester.harvest(&html).is_empty());
    }

    #[test]
    fn test_strip_blocks_keeps_surrounding_text() {
        let block = format!("{}('0 1',36,2,'a|b'.split('|'),0,{{}}))", DECODER);
        let text = format!("var a=1;{};var b=2;{}var c=3;", block, block);
        assert_eq!(
            PackedScriptHarvester::new().strip_blocks(&text),
            "var a=1;\n;var b=2;\nvar c=3;"
        );
        assert_eq!(PackedScriptHarvester::new().strip_blocks("var d=4;"), "var d=4;");
    }
}
