//! External collaborator that measures a (region, query) pair.

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::http::HttpSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("source answered with HTTP {0}")]
    Status(u16),
    #[error("unparsable response: {0}")]
    Unparsable(String),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Current number of results for the pair.
    async fn fetch_count(&self, region: &str, query: &str) -> Result<u64, SourceError>;

    /// Up to five item references, in the order the source ranks them.
    async fn fetch_top_items(&self, region: &str, query: &str) -> Result<Vec<String>, SourceError>;
}

/// Runs `fut`, turning an overrun of `limit` into [`SourceError::Timeout`].
pub async fn within<T, F>(limit: Duration, fut: F) -> Result<T, SourceError>
where
    F: std::future::Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}
