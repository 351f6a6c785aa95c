use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::{FetchOutcome, SnapshotKind};

// ─── Configuration ───────────────────────────────────────────────

/// Fetch latency range: 1 μs → 10 min, 3 significant figures
const FETCH_HIST_HIGH_US: u64 = 600_000_000;

/// Cycle duration range: 1 ms → 1 day
const CYCLE_HIST_HIGH_MS: u64 = 86_400_000;

const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe ingestion metrics.
/// The scheduler and snapshot pool record, `GET /metrics` reads snapshots.
pub struct IngestMetrics {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotCounters {
    pub stored: u64,
    pub source_failed: u64,
    pub store_failed: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub samples_recorded: u64,
    pub samples_gap: u64,
    pub store_failures: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,

    /// Source round-trip per entity (μs)
    pub fetch_latency_us: PercentileSet,
    /// Whole-cycle wall time (ms)
    pub cycle_duration_ms: PercentileSet,

    pub snapshots: SnapshotCounters,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    fetch_hist: Histogram<u64>,
    cycle_hist: Histogram<u64>,

    cycles: u64,
    recorded: u64,
    gaps: u64,
    store_failures: u64,
    last_cycle_at: Option<DateTime<Utc>>,

    snapshots: SnapshotCounters,
}

// ─── IngestMetrics impl ──────────────────────────────────────────

impl IngestMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// One entity handled by a cycle.
    pub fn record_fetch(&self, outcome: FetchOutcome, latency: Duration) {
        let mut inner = self.inner.lock();
        match outcome {
            FetchOutcome::Recorded => inner.recorded += 1,
            FetchOutcome::Gap => inner.gaps += 1,
            FetchOutcome::StoreFailed => inner.store_failures += 1,
        }
        let us = (latency.as_micros() as u64).max(1);
        inner.fetch_hist.saturating_record(us);
    }

    /// A finished cycle, stamped with the time it started.
    pub fn record_cycle(&self, started_at: DateTime<Utc>, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.cycles += 1;
        inner.last_cycle_at = Some(started_at);
        let ms = (elapsed.as_millis() as u64).max(1);
        inner.cycle_hist.saturating_record(ms);
    }

    pub fn record_snapshot(&self, kind: SnapshotKind) {
        let mut inner = self.inner.lock();
        let counters = &mut inner.snapshots;
        match kind {
            SnapshotKind::Stored => counters.stored += 1,
            SnapshotKind::SourceFailed => counters.source_failed += 1,
            SnapshotKind::StoreFailed => counters.store_failed += 1,
            SnapshotKind::Rejected => counters.rejected += 1,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            cycles: inner.cycles,
            samples_recorded: inner.recorded,
            samples_gap: inner.gaps,
            store_failures: inner.store_failures,
            last_cycle_at: inner.last_cycle_at,
            fetch_latency_us: PercentileSet::from_histogram(&inner.fetch_hist),
            cycle_duration_ms: PercentileSet::from_histogram(&inner.cycle_hist),
            snapshots: inner.snapshots.clone(),
        }
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            fetch_hist: histogram(FETCH_HIST_HIGH_US),
            cycle_hist: histogram(CYCLE_HIST_HIGH_MS),
            cycles: 0,
            recorded: 0,
            gaps: 0,
            store_failures: 0,
            last_cycle_at: None,
            snapshots: SnapshotCounters::default(),
        }
    }
}

fn histogram(high: u64) -> Histogram<u64> {
    Histogram::new_with_bounds(1, high, HIST_SIGFIG).expect("histogram creation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_outcomes_are_counted_separately() {
        let metrics = IngestMetrics::new();
        metrics.record_fetch(FetchOutcome::Recorded, Duration::from_millis(120));
        metrics.record_fetch(FetchOutcome::Recorded, Duration::from_millis(80));
        metrics.record_fetch(FetchOutcome::Gap, Duration::from_secs(5));
        metrics.record_fetch(FetchOutcome::StoreFailed, Duration::ZERO);

        let snap = metrics.snapshot();
        assert_eq!(snap.samples_recorded, 2);
        assert_eq!(snap.samples_gap, 1);
        assert_eq!(snap.store_failures, 1);
        assert_eq!(snap.fetch_latency_us.count, 4);
        assert_eq!(snap.cycles, 0);
        assert!(snap.last_cycle_at.is_none());
    }

    #[test]
    fn cycles_track_last_start() {
        let metrics = IngestMetrics::new();
        let started = Utc::now();
        metrics.record_cycle(started, Duration::from_millis(1500));

        let snap = metrics.snapshot();
        assert_eq!(snap.cycles, 1);
        assert_eq!(snap.last_cycle_at, Some(started));
        assert_eq!(snap.cycle_duration_ms.count, 1);
    }

    #[test]
    fn snapshot_jobs_are_tallied() {
        let metrics = IngestMetrics::new();
        metrics.record_snapshot(SnapshotKind::Stored);
        metrics.record_snapshot(SnapshotKind::Stored);
        metrics.record_snapshot(SnapshotKind::SourceFailed);
        metrics.record_snapshot(SnapshotKind::Rejected);

        let snap = metrics.snapshot().snapshots;
        assert_eq!(snap.stored, 2);
        assert_eq!(snap.source_failed, 1);
        assert_eq!(snap.store_failed, 0);
        assert_eq!(snap.rejected, 1);
    }
}
