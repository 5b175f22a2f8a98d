//! Worker Orchestrator (C6): composes the watcher, pipeline, engine, store,
//! and health surface into one long-running daemon, and owns the process
//! lifecycle — initial sync, the periodic full-sync backstop, and
//! signal-driven shutdown.

use photosync_core::{
    CatalogStore, Config, DirectoryWatcher, EventPipeline, HealthState, PostgresStore,
    ReconciliationEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Runs the worker to completion: startup, concurrent loops, and a clean
/// shutdown once a signal arrives. Returns once every loop has stopped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    store.run_migrations().await?;

    let health = Arc::new(HealthState::new());
    health.set_database_connected(store.health().await);

    let engine = Arc::new(ReconciliationEngine::new(config.photos_base_path.clone()));

    if config.initial_sync_on_startup {
        info!("running initial full sync before serving events");
        let stats = engine.full_sync(store.as_ref()).await?;
        info!(?stats, "initial full sync complete");
        health.record_full_sync(&stats, chrono::Utc::now());
    }

    let (watcher, events) = DirectoryWatcher::start(config.photos_base_path.clone())?;
    let watcher = Arc::new(watcher);
    health.set_watcher_active(watcher.is_alive());

    let pipeline = Arc::new(EventPipeline::new(
        config.event_debounce_delay,
        config.batch_timeout,
        config.max_batch_size,
        config.retry_attempts,
        config.retry_delay,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline_task = tokio::spawn({
        let pipeline = pipeline.clone();
        let engine = engine.clone();
        let store = store.clone();
        let health = health.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            pipeline.run(events, engine, store, health, shutdown_rx).await;
        }
    });

    let periodic_task = tokio::spawn(periodic_full_sync_loop(
        engine.clone(),
        store.clone(),
        health.clone(),
        config.periodic_sync_interval,
        shutdown_rx.clone(),
    ));

    let watcher_liveness_task = tokio::spawn(watcher_liveness_loop(
        watcher.clone(),
        health.clone(),
        shutdown_rx.clone(),
    ));

    let http_task = tokio::spawn({
        let health = health.clone();
        let port = config.health_check_port;
        let mut shutdown_rx = shutdown_rx.clone();
        async move {
            let shutdown_signal = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(err) = crate::http::serve(port, health, shutdown_signal).await {
                error!(error = %err, "health surface exited with an error");
            }
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping loops");
    let _ = shutdown_tx.send(true);

    let _ = pipeline_task.await;
    let _ = periodic_task.await;
    let _ = watcher_liveness_task.await;
    let _ = http_task.await;

    drop(watcher);
    info!("worker shut down cleanly");
    Ok(())
}

/// Polls the watcher's liveness flag into the health surface at a short,
/// fixed cadence so `GET /health` reflects a dead watcher thread promptly
/// rather than only at the next periodic full sync.
const WATCHER_LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

async fn watcher_liveness_loop(
    watcher: Arc<DirectoryWatcher>,
    health: Arc<HealthState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(WATCHER_LIVENESS_POLL_INTERVAL) => {}
        }
        if *shutdown.borrow() {
            break;
        }
        health.set_watcher_active(watcher.is_alive());
    }
}

/// Every `interval`, reconciles the whole catalog against the filesystem.
/// This is the backstop against lost watcher events: the watcher can drop
/// events under overflow or a network-filesystem gap, but the next full
/// sync always reaches the terminal state described by invariant I4.
async fn periodic_full_sync_loop(
    engine: Arc<ReconciliationEngine>,
    store: Arc<PostgresStore>,
    health: Arc<HealthState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match engine.full_sync(store.as_ref()).await {
            Ok(stats) => {
                info!(?stats, "periodic full sync complete");
                health.record_full_sync(&stats, chrono::Utc::now());
            }
            Err(err) => {
                warn!(error = %err, "periodic full sync failed; will retry next interval");
            }
        }
    }
    info!("periodic full-sync loop stopped");
}

/// Resolves once SIGINT or SIGTERM is received (or, on non-Unix targets,
/// once Ctrl-C is received).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received Ctrl-C");
}
