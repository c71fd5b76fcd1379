//! fleetmon Host Monitor
//!
//! Periodically walks every monitored cluster and infra-env and drives the
//! status and role refresh of their hosts. Every replica runs this binary;
//! only the one holding the leader lock performs passes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fleetmon_monitor::{
    api, config,
    db::Database,
    leader::{AlwaysLeader, LeaderElector, PgAdvisoryLeader},
    metrics::PrometheusMetrics,
    monitor::{DryRunRefresher, HostMonitor, MonitorWorker},
    state::AppState,
    store::PgMonitorStore,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to FLEETMON_LOG_LEVEL.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleetmon host monitor");
    info!(
        listen_addr = %config.listen_addr,
        interval_secs = config.monitor.interval.as_secs(),
        batch_size = config.monitor.batch_size,
        leader_election = config.leader.enabled,
        "Configuration loaded"
    );

    let db = match Database::connect(&config.database).await {
        Ok(db) => {
            info!("Database connection established");
            db
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };

    if config.dev_mode {
        info!("Running database migrations (dev mode)");
        if let Err(e) = db.run_migrations().await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The leader lock is released only after the monitor worker has stopped.
    let (election_tx, election_rx) = watch::channel(false);
    let mut election_handle = None;
    let leader: Arc<dyn LeaderElector> = if config.leader.enabled {
        let elector = PgAdvisoryLeader::new(config.leader.lock_key);
        election_handle = Some(tokio::spawn({
            let elector = elector.clone();
            let database_url = config.database.database_url.clone();
            let renew_interval = config.leader.renew_interval;
            async move {
                elector.run(database_url, renew_interval, election_rx).await;
            }
        }));
        Arc::new(elector)
    } else {
        warn!("Leader election disabled, this replica always runs passes");
        Arc::new(AlwaysLeader)
    };

    let metrics = PrometheusMetrics::new()?;

    // Host monitor worker
    let monitor = HostMonitor::new(
        Arc::new(PgMonitorStore::new(db.pool().clone())),
        leader.clone(),
        Arc::new(DryRunRefresher),
        Arc::new(DryRunRefresher),
        Arc::new(metrics.clone()),
        config.monitor.clone(),
    );
    let monitor_worker = MonitorWorker::new(monitor);
    let monitor_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            monitor_worker.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(db, leader, metrics);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, monitor_handle).await {
        warn!(error = %e, "Host monitor worker did not shut down in time");
    }

    let _ = election_tx.send(true);
    if let Some(handle) = election_handle {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Leader election did not shut down in time");
        }
    }

    info!("Host monitor shutdown complete");
    Ok(())
}
