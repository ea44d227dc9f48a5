use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use signer_relay::clock::{Clock, SystemClock};
use signer_relay::config::Args;
use signer_relay::handlers;
use signer_relay::state::AppState;
use signer_relay::{
    AdmissionPolicy, EventStore, MemoryStore, Pruner, RateLimiter, logging, spawn_pruner,
    spawn_sweeper,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    let settings = args.settings().context("invalid configuration")?;

    logging::init(&settings.log_level, settings.log_format)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Running signer-relay");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
    let stores = vec![store];

    let limiter = Arc::new(RateLimiter::new(
        settings.rate_limit,
        settings.rate_window,
        clock.clone(),
    ));
    info!(
        limit = settings.rate_limit,
        window_secs = settings.rate_window.as_secs(),
        "Rate limit per pubkey"
    );

    let policy = Arc::new(AdmissionPolicy::new(
        settings.acceptance_window,
        limiter.clone(),
        clock.clone(),
    ));
    let pruner = Arc::new(Pruner::new(stores.clone(), settings.prune.clone(), clock));

    // background tasks share one shutdown token
    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(limiter, settings.sweep_interval, cancel.clone());
    let prune_task = spawn_pruner(pruner, cancel.clone());

    let state = Arc::new(AppState { policy, stores });
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Relay running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Stopping background tasks");
    cancel.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = sweeper.await;
        let _ = prune_task.await;
    })
    .await;
    if drained.is_err() {
        warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Background tasks did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
