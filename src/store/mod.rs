//! Entity store: one durable record per tracked (region, query) pair.
//!
//! Two backends share the [`EntityStore`] contract:
//!
//! - [`RedisStore`] persists every mutation in Redis before returning.
//! - [`MemoryStore`] keeps everything in process; used by tests and by
//!   `--store memory` development runs.
//!
//! Both serialise mutations per entity, let different entities proceed in
//! parallel, and make creation atomic with respect to the uniqueness check.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{EntityHeader, EntityId, Sample, TrackedEntity};
use crate::range::TimeRange;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("({region}, {query}) is already tracked as {existing}")]
    AlreadyExists {
        existing: EntityId,
        region: String,
        query: String,
    },
    #[error("entity {0} not found")]
    NotFound(EntityId),
    #[error("sample at {attempted} would precede the last recorded sample at {last}")]
    OutOfOrder { last: f64, attempted: f64 },
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Registers a new pair with empty history and empty top items.
    ///
    /// Fails with [`StoreError::AlreadyExists`] (carrying the existing id)
    /// when the pair is already tracked.
    async fn create(&self, region: &str, query: &str) -> StoreResult<EntityId>;

    async fn get(&self, id: EntityId) -> StoreResult<TrackedEntity>;

    /// Appends to the end of the entity's history.
    ///
    /// Rejects a sample older than the last stored one with
    /// [`StoreError::OutOfOrder`]; the history is never re-sorted.
    async fn append_sample(&self, id: EntityId, sample: Sample) -> StoreResult<()>;

    /// Replaces the top-items snapshot wholesale.
    async fn set_top_items(&self, id: EntityId, items: Vec<String>) -> StoreResult<()>;

    /// Headers of every entity existing at call time, in creation order.
    async fn list_all(&self) -> StoreResult<Vec<EntityHeader>>;

    /// Samples with `range.start <= timestamp <= range.end`, in order.
    async fn samples_in_range(&self, id: EntityId, range: TimeRange) -> StoreResult<Vec<Sample>> {
        let entity = self.get(id).await?;
        Ok(range.slice(&entity.samples).to_vec())
    }

    async fn top_items(&self, id: EntityId) -> StoreResult<Vec<String>> {
        Ok(self.get(id).await?.top_items)
    }
}
