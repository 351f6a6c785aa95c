use std::sync::Arc;

use crate::model::{EntityId, Sample};
use crate::range::TimeRange;
use crate::store::{EntityStore, StoreResult};

/// Read-only view over the store: sample ranges and top-items snapshots.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn EntityStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Samples with `start <= timestamp <= end`, oldest first.
    ///
    /// An inverted interval is not an error; it simply matches nothing.
    pub async fn range_query(&self, id: EntityId, start: f64, end: f64) -> StoreResult<Vec<Sample>> {
        self.store
            .samples_in_range(id, TimeRange::new(start, end))
            .await
    }

    /// Latest top-items snapshot; empty until the snapshot job has run.
    pub async fn top_items(&self, id: EntityId) -> StoreResult<Vec<String>> {
        self.store.top_items(id).await
    }
}
