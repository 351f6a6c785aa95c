use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use listing_tracker::config::{Config, StoreBackend};
use listing_tracker::logging::init_logging;
use listing_tracker::metrics::IngestMetrics;
use listing_tracker::scheduler::IngestionScheduler;
use listing_tracker::snapshot::SnapshotPool;
use listing_tracker::source::{HttpSource, SampleSource};
use listing_tracker::store::{EntityStore, MemoryStore, RedisStore};
use listing_tracker::{server, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    if let Err(e) = init_logging(&config.logging()) {
        eprintln!("cannot initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "listing-tracker exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    // ── 1. Store ─────────────────────────────────────────────────
    let store: Arc<dyn EntityStore> = match config.store {
        StoreBackend::Redis => {
            tracing::info!(url = %config.redis_url, "connecting to Redis");
            Arc::new(RedisStore::connect(&config.redis_url).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // ── 2. Sample source ─────────────────────────────────────────
    let source: Arc<dyn SampleSource> =
        Arc::new(HttpSource::new(&config.source_url, config.fetch_timeout())?);

    // ── 3. Background workers ────────────────────────────────────
    let metrics = Arc::new(IngestMetrics::new());
    let snapshots = Arc::new(SnapshotPool::start(
        store.clone(),
        source.clone(),
        metrics.clone(),
        config.snapshots(),
    ));
    let scheduler = Arc::new(IngestionScheduler::new(
        store.clone(),
        source,
        metrics.clone(),
        config.scheduler(),
    ))
    .spawn();

    // ── 4. HTTP API ──────────────────────────────────────────────
    let state = Arc::new(AppState::new(store, snapshots.clone(), metrics));
    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        store = %config.store,
        source = %config.source_url,
        interval_secs = config.interval_secs,
        "listing-tracker listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // ── 5. Drain background work ─────────────────────────────────
    tracing::info!("shutting down background workers");
    scheduler.shutdown().await;
    snapshots.shutdown().await;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
