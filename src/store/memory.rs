use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::{EntityStore, StoreError, StoreResult};
use crate::model::{EntityHeader, EntityId, Sample, TrackedEntity, TOP_ITEMS_LIMIT};
use crate::range::TimeRange;

/// In-process store.
///
/// The index lock is held for writing only while a new entity is inserted,
/// which makes the uniqueness check and the insert one step. Every entity
/// sits behind its own mutex so appends and snapshot writes on different
/// entities never contend.
#[derive(Default)]
pub struct MemoryStore {
    index: RwLock<Index>,
}

#[derive(Default)]
struct Index {
    by_id: HashMap<EntityId, Arc<Mutex<TrackedEntity>>>,
    by_pair: HashMap<(String, String), EntityId>,
    order: Vec<EntityId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: EntityId) -> StoreResult<Arc<Mutex<TrackedEntity>>> {
        self.index
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create(&self, region: &str, query: &str) -> StoreResult<EntityId> {
        let mut index = self.index.write();
        let pair = (region.to_owned(), query.to_owned());

        if let Some(&existing) = index.by_pair.get(&pair) {
            return Err(StoreError::AlreadyExists {
                existing,
                region: pair.0,
                query: pair.1,
            });
        }

        let id = EntityId::new();
        let entity = TrackedEntity::new(EntityHeader {
            id,
            region: pair.0.clone(),
            query: pair.1.clone(),
            created_at: Utc::now(),
        });
        index.by_id.insert(id, Arc::new(Mutex::new(entity)));
        index.by_pair.insert(pair, id);
        index.order.push(id);
        Ok(id)
    }

    async fn get(&self, id: EntityId) -> StoreResult<TrackedEntity> {
        Ok(self.entry(id)?.lock().clone())
    }

    async fn append_sample(&self, id: EntityId, sample: Sample) -> StoreResult<()> {
        let entry = self.entry(id)?;
        let mut entity = entry.lock();
        if let Some(last) = entity.samples.last() {
            // `!(a <= b)` also rejects NaN timestamps.
            if !(last.timestamp <= sample.timestamp) {
                return Err(StoreError::OutOfOrder {
                    last: last.timestamp,
                    attempted: sample.timestamp,
                });
            }
        }
        entity.samples.push(sample);
        Ok(())
    }

    async fn set_top_items(&self, id: EntityId, mut items: Vec<String>) -> StoreResult<()> {
        items.truncate(TOP_ITEMS_LIMIT);
        self.entry(id)?.lock().top_items = items;
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<EntityHeader>> {
        let entries: Vec<_> = {
            let index = self.index.read();
            index
                .order
                .iter()
                .filter_map(|id| index.by_id.get(id).cloned())
                .collect()
        };
        Ok(entries.iter().map(|e| e.lock().header.clone()).collect())
    }

    async fn samples_in_range(&self, id: EntityId, range: TimeRange) -> StoreResult<Vec<Sample>> {
        let entry = self.entry(id)?;
        let entity = entry.lock();
        Ok(range.slice(&entity.samples).to_vec())
    }

    async fn top_items(&self, id: EntityId) -> StoreResult<Vec<String>> {
        Ok(self.entry(id)?.lock().top_items.clone())
    }
}
