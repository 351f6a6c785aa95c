pub mod collector;
pub mod percentiles;

pub use collector::{IngestMetrics, MetricsSnapshot};

/// What happened to one entity during an ingestion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The source answered and the sample carries a count.
    Recorded,
    /// The source failed; a gap sample was stored instead.
    Gap,
    /// The sample could not be stored at all.
    StoreFailed,
}

/// Result of one background top-items job, as seen by the metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Stored,
    SourceFailed,
    StoreFailed,
    Rejected,
}
