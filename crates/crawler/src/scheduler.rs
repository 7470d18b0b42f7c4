use crate::ingest::{IngestSink, JobIngestor};
use crate::metrics::Metrics;
use crate::orchestrator::{CrawlOptions, CrawlOrchestrator};
use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use job_hive_common::{SchedulerConfig, StrategyStats};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// RAII guard for the single-flight flag of scheduled rounds
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunPermit {
    /// Take the flag (compare-and-swap from false to true). None when a round
    /// already holds it.
    pub fn try_acquire(running: &Arc<AtomicBool>) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                running: running.clone(),
            })
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub saved: usize,
    pub skipped: usize,
    pub per_strategy: BTreeMap<String, StrategyStats>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum RoundOutcome {
    Completed(RoundReport),
    /// Another round held the permit; nothing ran
    Skipped,
}

/// Runs collection rounds over the configured strategies, one round at a time
pub struct ScheduledRunner {
    orchestrator: Arc<CrawlOrchestrator>,
    ingestor: JobIngestor,
    metrics: Metrics,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl ScheduledRunner {
    pub fn new(
        orchestrator: Arc<CrawlOrchestrator>,
        ingestor: JobIngestor,
        metrics: Metrics,
        config: SchedulerConfig,
    ) -> Self {
        for name in &config.strategies {
            if !orchestrator.has_strategy(name) {
                warn!(strategy = %name, "Scheduled strategy is not registered");
            }
        }
        Self {
            orchestrator,
            ingestor,
            metrics,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take the round permit without running anything yet
    pub fn try_begin(&self) -> Option<RunPermit> {
        let permit = RunPermit::try_acquire(&self.running);
        if permit.is_none() {
            info!("Collection round already running, trigger ignored");
            self.metrics.rounds.with_label_values(&["skipped"]).inc();
        }
        permit
    }

    /// Cron entry point
    pub async fn run_scheduled(&self) -> RoundOutcome {
        info!("Scheduled collection round triggered");
        self.trigger().await
    }

    /// Manual entry point, same exclusivity as the cron trigger
    pub async fn trigger_now(&self) -> RoundOutcome {
        info!("Manual collection round triggered");
        self.trigger().await
    }

    async fn trigger(&self) -> RoundOutcome {
        match self.try_begin() {
            Some(permit) => RoundOutcome::Completed(self.run_round(permit).await),
            None => RoundOutcome::Skipped,
        }
    }

    /// Run one round under `permit`. The permit is released when the round
    /// ends, whatever the outcome.
    pub async fn run_round(&self, permit: RunPermit) -> RoundReport {
        let _permit = permit;
        let start_time = Instant::now();
        let mut report = RoundReport::default();

        info!(
            "Starting collection round over {} strateg(ies): {}",
            self.config.strategies.len(),
            self.config.strategies.join(", ")
        );

        for name in &self.config.strategies {
            let sink = Arc::new(IngestSink::new(
                name.clone(),
                self.ingestor.clone(),
                self.metrics.clone(),
            ));
            let options = CrawlOptions {
                keyword: self.config.keyword.clone(),
                max_results: Some(self.config.max_results),
                headless: true,
                sink: Some(sink.clone()),
            };

            let error = match self.orchestrator.crawl(name, options).await {
                Ok(_) => None,
                Err(e) => {
                    error!(strategy = %name, "Strategy failed during collection round: {}", e);
                    self.metrics
                        .crawl_failures
                        .with_label_values(&[name.as_str()])
                        .inc();
                    Some(e.to_string())
                }
            };

            let stats = StrategyStats {
                saved: sink.saved(),
                skipped: sink.skipped(),
                error,
            };
            info!(
                strategy = %name,
                "Strategy done: {} saved, {} skipped",
                stats.saved,
                stats.skipped
            );
            report.saved += stats.saved;
            report.skipped += stats.skipped;
            report.per_strategy.insert(name.clone(), stats);
        }

        self.orchestrator.park().await;

        report.elapsed = start_time.elapsed();
        self.metrics.rounds.with_label_values(&["completed"]).inc();
        info!(
            "Collection round finished in {:.1}s: {} saved, {} skipped",
            report.elapsed.as_secs_f64(),
            report.saved,
            report.skipped
        );
        report
    }
}

/// Register the cron job for `runner` and start the scheduler. The returned
/// handle must be kept alive.
pub async fn start_scheduler(runner: Arc<ScheduledRunner>, config: &SchedulerConfig) -> Result<JobScheduler> {
    let timezone: Tz = config
        .timezone
        .parse()
        .map_err(|e| anyhow!("invalid scheduler timezone '{}': {}", config.timezone, e))?;

    let job = Job::new_async_tz(config.cron.as_str(), timezone, move |_uuid, _lock| {
        let runner = runner.clone();
        Box::pin(async move {
            if let RoundOutcome::Completed(report) = runner.run_scheduled().await {
                info!(
                    "Scheduled round stored {} new job(s) across {} strateg(ies)",
                    report.saved,
                    report.per_strategy.len()
                );
            }
        })
    })
    .with_context(|| format!("invalid scheduler cron expression '{}'", config.cron))?;

    let scheduler = JobScheduler::new().await.context("creating scheduler")?;
    scheduler.add(job).await.context("adding scheduler job")?;
    scheduler.start().await.context("starting scheduler")?;

    info!(
        "Scheduler started: '{}' ({}) for strategies {}",
        config.cron,
        config.timezone,
        config.strategies.join(", ")
    );
    Ok(scheduler)
}
