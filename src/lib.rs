//! # streamsift - content deobfuscation and media source resolution
//!
//! Decodes the layered encodings, packed scripts and AES-wrapped payloads
//! that video hosting pages hide their stream URLs behind, and merges the
//! evidence from many noisy detectors into one deduplicated list of
//! candidate media sources.
//!
//! ## Features
//!
//! - Fail-soft decode pipelines (Base64, hex, percent, ROT13, reversal)
//! - P.A.C.K.E.R. unpacking and packed-script harvesting from raw HTML
//! - AES-128-CBC resolution against a list of candidate IVs
//! - Priority-ordered media source aggregation with provenance tags
//!
//! ## Example
//!
//! ```rust
//! use streamsift::harvest::harvest;
//!
//! let html = "<script>var src = 'https://cdn.example.com/v.mp4';</script>";
//! let result = harvest(html);
//! assert!(result.unpacked_scripts.is_empty());
//! ```

pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod harvest;
pub mod media;
pub mod utils;

// Re-export main types
pub use config::SiftConfig;
pub use decode::{
    AesResolver, DecodePipeline, DecodeResult, EncodedPayload, Encoding, PackedScriptBlock,
};
pub use error::SiftError;
pub use harvest::{HarvestResult, PackedScriptHarvester};
pub use media::{
    AggregateResult, MediaSourceAggregator, MediaSourceCandidate, PageSession, Provenance, Scanner,
};

/// Result type alias for streamsift operations
pub type Result<T> = std::result::Result<T, SiftError>;
