use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    pub pool_sessions: IntGauge,
    pub pool_idle_sessions: IntGauge,
    pub jobs_saved: IntCounterVec,
    pub jobs_skipped: IntCounterVec,
    pub crawl_failures: IntCounterVec,
    pub rounds: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        // Live browser sessions in the pool
        let pool_sessions = IntGauge::new(
            "job_hive_pool_sessions",
            "Number of browser sessions currently held by the pool",
        )?;
        registry.register(Box::new(pool_sessions.clone()))?;

        let pool_idle_sessions = IntGauge::new(
            "job_hive_pool_idle_sessions",
            "Number of pooled browser sessions that are idle",
        )?;
        registry.register(Box::new(pool_idle_sessions.clone()))?;

        let jobs_saved = IntCounterVec::new(
            Opts::new("job_hive_jobs_saved_total", "Job postings persisted"),
            &["strategy"],
        )?;
        registry.register(Box::new(jobs_saved.clone()))?;

        // Duplicates by (url, source)
        let jobs_skipped = IntCounterVec::new(
            Opts::new(
                "job_hive_jobs_skipped_total",
                "Job postings skipped because they were already stored",
            ),
            &["strategy"],
        )?;
        registry.register(Box::new(jobs_skipped.clone()))?;

        let crawl_failures = IntCounterVec::new(
            Opts::new("job_hive_crawl_failures_total", "Failed strategy crawls"),
            &["strategy"],
        )?;
        registry.register(Box::new(crawl_failures.clone()))?;

        // outcome = completed | skipped
        let rounds = IntCounterVec::new(
            Opts::new("job_hive_rounds_total", "Scheduled collection rounds"),
            &["outcome"],
        )?;
        registry.register(Box::new(rounds.clone()))?;

        Ok(Self {
            registry,
            pool_sessions,
            pool_idle_sessions,
            jobs_saved,
            jobs_skipped,
            crawl_failures,
            rounds,
        })
    }

    pub fn set_pool_sizes(&self, total: usize, idle: usize) {
        self.pool_sessions.set(total as i64);
        self.pool_idle_sessions.set(idle as i64);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub async fn metrics_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    match metrics.render() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}
