//! Top-items snapshots taken once, right after an entity is registered.
//!
//! Registration hands a job to a bounded queue served by a fixed number of
//! workers and returns at once. Each job yields a [`SnapshotOutcome`] through
//! its [`SnapshotTicket`]; the HTTP layer drops the ticket, tests await it.
//! A failed fetch leaves the entity with an empty top-items list for good.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics::{IngestMetrics, SnapshotKind};
use crate::model::{EntityId, TOP_ITEMS_LIMIT};
use crate::source::{self, SampleSource};
use crate::store::EntityStore;

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub fetch_timeout: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Snapshot written; holds the number of items.
    Stored(usize),
    SourceFailed(String),
    StoreFailed(String),
    /// Never ran: the queue was full or the pool was shutting down.
    Rejected,
}

impl SnapshotOutcome {
    fn kind(&self) -> SnapshotKind {
        match self {
            Self::Stored(_) => SnapshotKind::Stored,
            Self::SourceFailed(_) => SnapshotKind::SourceFailed,
            Self::StoreFailed(_) => SnapshotKind::StoreFailed,
            Self::Rejected => SnapshotKind::Rejected,
        }
    }
}

/// Completion handle for one dispatched job.
#[derive(Debug)]
pub struct SnapshotTicket {
    rx: oneshot::Receiver<SnapshotOutcome>,
}

impl SnapshotTicket {
    fn resolved(outcome: SnapshotOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }

    pub async fn wait(self) -> SnapshotOutcome {
        self.rx.await.unwrap_or(SnapshotOutcome::Rejected)
    }
}

struct SnapshotJob {
    id: EntityId,
    region: String,
    query: String,
    done: oneshot::Sender<SnapshotOutcome>,
}

struct Shared {
    store: Arc<dyn EntityStore>,
    source: Arc<dyn SampleSource>,
    metrics: Arc<IngestMetrics>,
    fetch_timeout: Duration,
}

pub struct SnapshotPool {
    tx: Mutex<Option<mpsc::Sender<SnapshotJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<IngestMetrics>,
}

impl SnapshotPool {
    /// Spawns the workers; must be called inside a Tokio runtime.
    pub fn start(
        store: Arc<dyn EntityStore>,
        source: Arc<dyn SampleSource>,
        metrics: Arc<IngestMetrics>,
        config: SnapshotConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shared = Arc::new(Shared {
            store,
            source,
            metrics: metrics.clone(),
            fetch_timeout: config.fetch_timeout,
        });

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let shared = shared.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting for a job.
                        let job = rx.lock().await.recv().await;
                        match job {
                            Some(job) => shared.run(worker, job).await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            metrics,
        }
    }

    /// Queues a snapshot for a freshly created entity without waiting for it.
    pub fn dispatch(&self, id: EntityId, region: &str, query: &str) -> SnapshotTicket {
        let (done, rx) = oneshot::channel();
        let job = SnapshotJob {
            id,
            region: region.to_owned(),
            query: query.to_owned(),
            done,
        };

        let queued = match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(job).map_err(|e| e.to_string()),
            None => Err("pool is shut down".to_string()),
        };

        match queued {
            Ok(()) => SnapshotTicket { rx },
            Err(reason) => {
                warn!(entity_id = %id, %reason, "top-items snapshot rejected");
                self.metrics.record_snapshot(SnapshotKind::Rejected);
                SnapshotTicket::resolved(SnapshotOutcome::Rejected)
            }
        }
    }

    /// Stops accepting jobs, lets the workers drain the queue, waits for them.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "snapshot worker panicked");
            }
        }
    }
}

impl Shared {
    async fn run(&self, worker: usize, job: SnapshotJob) {
        let SnapshotJob {
            id,
            region,
            query,
            done,
        } = job;

        let fetched = source::within(
            self.fetch_timeout,
            self.source.fetch_top_items(&region, &query),
        )
        .await;

        let outcome = match fetched {
            Ok(items) => {
                let n = items.len().min(TOP_ITEMS_LIMIT);
                match self.store.set_top_items(id, items).await {
                    Ok(()) => {
                        info!(worker, entity_id = %id, %region, %query, items = n, "top items stored");
                        SnapshotOutcome::Stored(n)
                    }
                    Err(e) => {
                        error!(worker, entity_id = %id, error = %e, "cannot store top items");
                        SnapshotOutcome::StoreFailed(e.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(worker, entity_id = %id, %region, %query, error = %e, "top items fetch failed");
                SnapshotOutcome::SourceFailed(e.to_string())
            }
        };

        self.metrics.record_snapshot(outcome.kind());
        let _ = done.send(outcome);
    }
}
