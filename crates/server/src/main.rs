//! rankx maintenance daemon.
//!
//! Runs the background job worker (ranking retries, badge checks) and the
//! periodic counter reconciliation against the shared database.
//!
//! Usage: `rankx [CONFIG_FILE]`

use std::sync::Arc;
use std::time::Duration;

use rankx_common::Config;
use rankx_core::{BadgeService, JobService, JobWorkerContext, RankingEngine, ReconcileService};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "rankx=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // An explicit path skips the layered lookup
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    init_tracing(&config);

    info!("Starting rankx maintenance daemon...");

    let db = Arc::new(rankx_db::init(&config).await?);
    info!("Connected to database");

    info!("Running database migrations...");
    rankx_db::migrate(&db).await?;
    info!("Migrations completed");

    let badges = BadgeService::new(db.clone(), config.badges.clone());
    let seeded = badges.seed_default_badges().await?;
    info!(seeded = seeded, "Badge catalog ready");

    // The worker holds a sender for its own retries
    let jobs = JobService::new(&config.worker);
    let sender = jobs.sender();
    let ranking = RankingEngine::with_jobs(db.clone(), sender.clone());
    let reconcile = ReconcileService::new(db.clone(), ranking.clone());

    let worker = jobs.start(JobWorkerContext {
        ranking,
        badges: Some(badges),
        reconcile: Some(reconcile),
        sender: sender.clone(),
        ranking_max_attempts: config.worker.ranking_max_attempts,
    });
    info!(
        max_workers = config.worker.max_workers,
        queue_size = config.worker.queue_size,
        "Job worker started"
    );

    let scheduler = (config.worker.reconcile_interval_secs > 0).then(|| {
        let period = Duration::from_secs(config.worker.reconcile_interval_secs);
        let sender = sender.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = sender.reconcile_counters() {
                    warn!(error = %e, "Failed to enqueue counter reconciliation");
                }
            }
        })
    });
    if scheduler.is_none() {
        info!("Periodic counter reconciliation disabled");
    }

    shutdown_signal().await;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    worker.abort();

    info!("Daemon shutdown complete");
    Ok(())
}
