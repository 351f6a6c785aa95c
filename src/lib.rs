//! Tracks how many results a listing site reports for registered
//! (region, query) pairs, sampled on a fixed period, and serves range and
//! top-items queries over the recorded history.

pub mod config;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod query;
pub mod range;
pub mod scheduler;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod store;

use std::sync::Arc;

use crate::metrics::IngestMetrics;
use crate::model::EntityId;
use crate::query::QueryEngine;
use crate::snapshot::{SnapshotPool, SnapshotTicket};
use crate::store::{EntityStore, StoreResult};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub store: Arc<dyn EntityStore>,

    /// Read side: range and top-items lookups.
    pub queries: QueryEngine,

    /// Takes the one-off top-items snapshot of each new entity.
    pub snapshots: Arc<SnapshotPool>,

    /// Written by the scheduler and the snapshot pool, read by `/metrics`.
    pub metrics: Arc<IngestMetrics>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EntityStore>,
        snapshots: Arc<SnapshotPool>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            queries: QueryEngine::new(store.clone()),
            store,
            snapshots,
            metrics,
        }
    }

    /// Creates the entity and queues its top-items snapshot.
    ///
    /// Returns as soon as the entity exists; the ticket resolves when the
    /// snapshot job finishes.
    pub async fn register(&self, region: &str, query: &str) -> StoreResult<(EntityId, SnapshotTicket)> {
        let id = match self.store.create(region, query).await {
            Ok(id) => id,
            Err(e) => {
                tracing::info!(%region, %query, error = %e, "registration refused");
                return Err(e);
            }
        };
        tracing::info!(entity_id = %id, %region, %query, "entity registered");

        let ticket = self.snapshots.dispatch(id, region, query);
        Ok((id, ticket))
    }
}
