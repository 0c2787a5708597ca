//! Packed-script harvesting and URL mining

pub mod mining;
pub mod packed;

pub use mining::{extract_media_assignments, extract_stream_urls, extract_urls, is_stream_url};
pub use packed::{HarvestResult, HarvestStrategy, PackedScriptHarvester};

/// Harvest packed scripts from `html` with default limits
pub fn harvest(html: &str) -> HarvestResult {
    PackedScriptHarvester::new().harvest(html)
}
