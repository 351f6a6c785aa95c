use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of item references kept per snapshot.
pub const TOP_ITEMS_LIMIT: usize = 5;

// ─── Identity ────────────────────────────────────────────────────

/// Opaque identifier of a tracked (region, query) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntityId {
    type Error = InvalidId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Raised when an id string supplied by a caller is not a valid [`EntityId`].
#[derive(Debug, Clone, Error)]
#[error("malformed entity id '{0}'")]
pub struct InvalidId(pub String);

impl FromStr for EntityId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| InvalidId(s.to_owned()))
    }
}

// ─── Samples ─────────────────────────────────────────────────────

/// One timestamped count observation.
///
/// `count` is `None` when the source could not be reached or its response
/// could not be parsed. Such gap samples are stored like any other so the
/// history shows where sampling failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub count: Option<u64>,
}

impl Sample {
    pub fn recorded(timestamp: f64, count: u64) -> Self {
        Self {
            timestamp,
            count: Some(count),
        }
    }

    pub fn gap(timestamp: f64) -> Self {
        Self {
            timestamp,
            count: None,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.count.is_none()
    }
}

// ─── Entities ────────────────────────────────────────────────────

/// Identity part of a tracked entity, without its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHeader {
    pub id: EntityId,
    pub region: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
}

/// Full record: identity, sample history and the latest top-items snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    #[serde(flatten)]
    pub header: EntityHeader,
    /// Ordered by non-decreasing timestamp.
    pub samples: Vec<Sample>,
    pub top_items: Vec<String>,
}

impl TrackedEntity {
    pub fn new(header: EntityHeader) -> Self {
        Self {
            header,
            samples: Vec::new(),
            top_items: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.header.id
    }
}

// ─── Regions ─────────────────────────────────────────────────────

/// A region is a lowercase latin slug (`moskva`, `spb`); it becomes a path
/// segment of the source URL.
pub fn is_valid_region(region: &str) -> bool {
    !region.is_empty() && region.bytes().all(|b| b.is_ascii_lowercase())
}
