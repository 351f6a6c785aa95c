use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::logging::{LogConfig, LogFormat};
use crate::scheduler::SchedulerConfig;
use crate::snapshot::SnapshotConfig;

/// Where tracked entities live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Durable Redis store.
    Redis,
    /// In-process store; everything is lost on exit.
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("fetch timeout ({timeout:?}) must be shorter than the interval ({interval:?})")]
    TimeoutExceedsInterval { timeout: Duration, interval: Duration },
}

/// Tracks result counts for (region, query) pairs over time.
#[derive(Debug, Clone, Parser)]
#[command(name = "listing-tracker", version, about)]
pub struct Config {
    /// Address the HTTP API binds to
    #[arg(long, env = "TRACKER_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Storage backend
    #[arg(long, env = "TRACKER_STORE", value_enum, default_value_t = StoreBackend::Redis)]
    pub store: StoreBackend,

    /// Redis connection URL (redis backend only)
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    /// Base URL of the listing site that gets sampled
    #[arg(long, env = "TRACKER_SOURCE_URL", default_value = "https://www.avito.ru")]
    pub source_url: String,

    /// Seconds between the starts of two ingestion cycles
    #[arg(long, env = "TRACKER_INTERVAL_SECS", default_value_t = 180)]
    pub interval_secs: u64,

    /// Seconds before a single source request counts as failed
    #[arg(long, env = "TRACKER_FETCH_TIMEOUT_SECS", default_value_t = 5)]
    pub fetch_timeout_secs: u64,

    /// Entities sampled in parallel within a cycle
    #[arg(long, env = "TRACKER_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// Workers taking top-items snapshots for new entities
    #[arg(long, env = "TRACKER_SNAPSHOT_WORKERS", default_value_t = 4)]
    pub snapshot_workers: usize,

    /// Pending snapshot jobs before new ones are rejected
    #[arg(long, env = "TRACKER_SNAPSHOT_QUEUE", default_value_t = 256)]
    pub snapshot_queue: usize,

    /// Log level filter; RUST_LOG takes precedence
    #[arg(long, env = "TRACKER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "TRACKER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, env = "TRACKER_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Zero("interval"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Zero("fetch timeout"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if self.snapshot_workers == 0 {
            return Err(ConfigError::Zero("snapshot workers"));
        }
        if self.snapshot_queue == 0 {
            return Err(ConfigError::Zero("snapshot queue"));
        }
        if self.fetch_timeout_secs >= self.interval_secs {
            return Err(ConfigError::TimeoutExceedsInterval {
                timeout: self.fetch_timeout(),
                interval: self.interval(),
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval(),
            fetch_timeout: self.fetch_timeout(),
            concurrency: self.concurrency,
        }
    }

    pub fn snapshots(&self) -> SnapshotConfig {
        SnapshotConfig {
            workers: self.snapshot_workers,
            queue_capacity: self.snapshot_queue,
            fetch_timeout: self.fetch_timeout(),
        }
    }

    pub fn logging(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
            file: self.log_file.clone(),
        }
    }
}
