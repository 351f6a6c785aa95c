//! Periodic ingestion: one sample per tracked entity per cycle.
//!
//! Cycles start on a steady period measured from the previous cycle's start.
//! A cycle that overruns the period delays the next one until it finishes;
//! two cycles never run at the same time. Within a cycle every entity is
//! handled independently: a failed fetch becomes a gap sample and the cycle
//! moves on. Nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::metrics::{FetchOutcome, IngestMetrics};
use crate::model::{EntityHeader, Sample};
use crate::source::{self, SampleSource};
use crate::store::EntityStore;

// ─── Clocks ──────────────────────────────────────────────────────

/// Wall-clock source for sample timestamps, in seconds since the epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Hands out sample timestamps that never go backwards, even if the wall
/// clock does. Range queries binary-search histories on this guarantee.
pub struct SampleClock {
    clock: Arc<dyn Clock>,
    last: Mutex<f64>,
}

impl SampleClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: Mutex::new(f64::NEG_INFINITY),
        }
    }

    pub fn stamp(&self) -> f64 {
        let now = self.clock.now();
        let mut last = self.last.lock();
        if now > *last {
            *last = now;
        }
        *last
    }
}

// ─── Scheduler ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between cycle starts.
    pub interval: Duration,
    /// Upper bound on a single source call.
    pub fetch_timeout: Duration,
    /// Entities fetched in parallel within one cycle.
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(180),
            fetch_timeout: Duration::from_secs(5),
            concurrency: 4,
        }
    }
}

/// Summary of one pass over all entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub entities: usize,
    pub recorded: usize,
    pub gaps: usize,
    pub store_failures: usize,
    /// Entities not visited because shutdown was requested mid-cycle.
    pub skipped: usize,
    pub elapsed: Duration,
}

enum EntityResult {
    Done(FetchOutcome),
    Skipped,
}

pub struct IngestionScheduler {
    store: Arc<dyn EntityStore>,
    source: Arc<dyn SampleSource>,
    metrics: Arc<IngestMetrics>,
    clock: SampleClock,
    config: SchedulerConfig,
    cycles: AtomicU64,
    // Serialises cycles, including ones triggered outside the timer loop.
    running: tokio::sync::Mutex<()>,
}

impl IngestionScheduler {
    pub fn new(
        store: Arc<dyn EntityStore>,
        source: Arc<dyn SampleSource>,
        metrics: Arc<IngestMetrics>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            source,
            metrics,
            clock: SampleClock::new(Arc::new(SystemClock)),
            config,
            cycles: AtomicU64::new(0),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = SampleClock::new(clock);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs one full cycle to completion.
    pub async fn run_cycle(&self) -> CycleReport {
        let (_tx, stop) = watch::channel(false);
        self.run_cycle_until(&stop).await
    }

    /// Runs one cycle; entities not yet started when `stop` flips to `true`
    /// are skipped. Samples already being fetched are still stored.
    pub async fn run_cycle_until(&self, stop: &watch::Receiver<bool>) -> CycleReport {
        let _guard = self.running.lock().await;

        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let started = Instant::now();

        let entities = match self.store.list_all().await {
            Ok(entities) => entities,
            Err(e) => {
                error!(cycle, error = %e, "cannot enumerate tracked entities");
                Vec::new()
            }
        };
        debug!(cycle, entities = entities.len(), "ingestion cycle started");

        let mut report = CycleReport {
            cycle,
            entities: entities.len(),
            ..CycleReport::default()
        };

        // Each future owns its header so the stream holds no borrow of `entities`.
        let results: Vec<EntityResult> = stream::iter(entities)
            .map(|entity| async move { self.sample_entity(cycle, &entity, stop).await })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                EntityResult::Done(FetchOutcome::Recorded) => report.recorded += 1,
                EntityResult::Done(FetchOutcome::Gap) => report.gaps += 1,
                EntityResult::Done(FetchOutcome::StoreFailed) => report.store_failures += 1,
                EntityResult::Skipped => report.skipped += 1,
            }
        }
        report.elapsed = started.elapsed();
        self.metrics.record_cycle(started_at, report.elapsed);

        info!(
            cycle,
            entities = report.entities,
            recorded = report.recorded,
            gaps = report.gaps,
            store_failures = report.store_failures,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingestion cycle finished"
        );
        report
    }

    async fn sample_entity(
        &self,
        cycle: u64,
        entity: &EntityHeader,
        stop: &watch::Receiver<bool>,
    ) -> EntityResult {
        if *stop.borrow() {
            return EntityResult::Skipped;
        }

        let started = Instant::now();
        let fetched = source::within(
            self.config.fetch_timeout,
            self.source.fetch_count(&entity.region, &entity.query),
        )
        .await;
        let timestamp = self.clock.stamp();

        let sample = match fetched {
            Ok(count) => Sample::recorded(timestamp, count),
            Err(e) => {
                warn!(
                    cycle,
                    entity_id = %entity.id,
                    region = %entity.region,
                    query = %entity.query,
                    error = %e,
                    "count fetch failed, recording gap"
                );
                Sample::gap(timestamp)
            }
        };

        let outcome = match self.store.append_sample(entity.id, sample).await {
            Ok(()) if sample.is_gap() => FetchOutcome::Gap,
            Ok(()) => {
                debug!(cycle, entity_id = %entity.id, count = ?sample.count, "sample recorded");
                FetchOutcome::Recorded
            }
            Err(e) => {
                error!(cycle, entity_id = %entity.id, error = %e, "cannot store sample");
                FetchOutcome::StoreFailed
            }
        };
        self.metrics.record_fetch(outcome, started.elapsed());
        EntityResult::Done(outcome)
    }

    /// Starts the timer loop. The first cycle runs immediately.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let scheduler = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = scheduler.config.interval.as_secs_f64(),
                "ingestion scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.run_cycle_until(&stop_rx).await;
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("ingestion scheduler stopped");
        });

        SchedulerHandle { stop_tx, task }
    }
}

/// Owner of a running timer loop.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the loop and waits for it. A cycle in flight finishes the
    /// entities it already started and skips the rest.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "ingestion scheduler task failed");
        }
    }
}
