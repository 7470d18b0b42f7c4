pub mod browser;
pub mod chrome;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod pagination;
pub mod scheduler;
pub mod session_pool;
pub mod store;
pub mod strategies;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use browser::{BrowserSession, LaunchOptions, Page, SessionLauncher};
pub use chrome::ChromeLauncher;
pub use ingest::{IngestSink, JobIngestor};
pub use metrics::Metrics;
pub use orchestrator::{CrawlOptions, CrawlOrchestrator};
pub use pagination::{PaginatedSource, PaginationDriver, PaginationReport, StopReason};
pub use scheduler::{start_scheduler, RoundOutcome, RoundReport, RunPermit, ScheduledRunner};
pub use session_pool::{SessionPool, DEFAULT_SESSION_KEY};
pub use store::{JobStore, MemoryJobStore, PgJobStore, StoreError};
pub use strategies::{builtin_registry, ListingSite, ListingStrategy};
pub use strategy::{BatchSink, CrawlStrategy, StrategyOptions, StrategyRegistry};

use anyhow::Result;
use job_hive_common::AppConfig;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the job-hive service with given configuration
///
/// Wires the session pool, the built-in strategies, the job store, the cron
/// scheduler and the HTTP API, then serves until SIGINT/SIGTERM.
///
/// # Example
///
/// ```rust,ignore
/// use job_hive_common::AppConfig;
/// use job_hive_crawler::run_server;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_server(AppConfig::from_env()).await
/// }
/// ```
pub async fn run_server(config: AppConfig) -> Result<()> {
    info!(
        "Starting job-hive on port {} (max sessions: {}, scheduler: {})",
        config.server.http_port,
        config.pool.max_sessions,
        if config.scheduler.enabled { "enabled" } else { "disabled" }
    );

    let cancellation_token = CancellationToken::new();
    let metrics = Metrics::new()?;

    let store: Arc<dyn JobStore> = match config.server.database_url.as_deref() {
        Some(database_url) => {
            let store = PgJobStore::connect(database_url).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set - jobs are kept in memory only");
            Arc::new(MemoryJobStore::new())
        }
    };
    let ingestor = JobIngestor::new(store);

    let pool = Arc::new(SessionPool::new(
        config.pool.clone(),
        Arc::new(ChromeLauncher::new()),
        metrics.clone(),
    ));
    let idle_monitor = pool.start_idle_monitor(cancellation_token.clone());

    let registry = builtin_registry(config.crawl.page_delay, config.pool.navigation_timeout)?;
    let orchestrator = Arc::new(CrawlOrchestrator::new(
        pool.clone(),
        registry,
        config.crawl.default_max_results,
    ));
    let runner = Arc::new(ScheduledRunner::new(
        orchestrator.clone(),
        ingestor.clone(),
        metrics.clone(),
        config.scheduler.clone(),
    ));

    let mut scheduler = if config.scheduler.enabled {
        Some(start_scheduler(runner.clone(), &config.scheduler).await?)
    } else {
        info!("Scheduler disabled");
        None
    };

    let app = http::router(http::AppState {
        orchestrator: orchestrator.clone(),
        runner,
        ingestor,
        metrics,
        crawl: config.crawl.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation_token.clone()))
        .await?;
    info!("HTTP server shutdown complete");

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            warn!("Failed to stop scheduler: {}", e);
        }
    }
    if let Err(e) = idle_monitor.await {
        warn!("Idle monitor task failed: {}", e);
    }

    orchestrator.shutdown().await;
    pool.shutdown().await;

    info!("job-hive shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C signal");
        },
        _ = terminate => {
            warn!("Received SIGTERM signal");
        },
    }

    // Stops the idle monitor; in-flight crawls finish on their own
    info!("Cancelling background tasks...");
    cancellation_token.cancel();
}
