//! Media source detection and aggregation

pub mod aggregator;
pub mod candidate;
pub mod page;
pub mod probes;
pub mod scanner;

pub use aggregator::{
    AggregateResult, DetectorReport, DetectorStatus, MediaSourceAggregator, SourceCounts,
};
pub use candidate::{MediaKind, MediaSourceCandidate, PlayerState, Provenance};
pub use page::{HttpFetcher, PageSession, TextFetcher};
pub use probes::{MediaProbe, ProbeOutcome};
pub use scanner::Scanner;
