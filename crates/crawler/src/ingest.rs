use crate::metrics::Metrics;
use crate::store::{JobStore, StoreError};
use crate::strategy::BatchSink;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use job_hive_common::{normalize_posted_at, CrawlError, JobRecord, NewJob, PersistOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Deduplicates job records on (url, source) and persists the new ones
#[derive(Clone)]
pub struct JobIngestor {
    store: Arc<dyn JobStore>,
}

impl JobIngestor {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Persist every record not stored yet. Records whose (url, source) is
    /// already taken, including ones lost to a concurrent insert, are skipped.
    pub async fn persist_batch(&self, records: &[JobRecord]) -> Result<PersistOutcome, CrawlError> {
        let mut outcome = PersistOutcome::default();
        self.persist_batch_into(records, &mut outcome).await?;
        Ok(outcome)
    }

    /// Like `persist_batch`, but records progress in `outcome` so a store
    /// failure partway through still reports what was already written.
    pub async fn persist_batch_into(
        &self,
        records: &[JobRecord],
        outcome: &mut PersistOutcome,
    ) -> Result<(), CrawlError> {
        let now = Utc::now();

        for record in records {
            let existing = self
                .store
                .find_by_url_and_source(&record.url, &record.source)
                .await
                .map_err(persistence_error)?;
            if existing.is_some() {
                outcome.skipped += 1;
                continue;
            }

            let job = NewJob {
                title: record.title.clone(),
                company: record.company.clone(),
                url: record.url.clone(),
                source: record.source.clone(),
                description: record.description.clone(),
                location: record.location.clone(),
                salary: record.salary.clone(),
                tags: record.tags.clone(),
                posted_at: record
                    .posted_at
                    .as_deref()
                    .and_then(|raw| normalize_posted_at(raw, now)),
            };

            match self.store.create(job).await {
                Ok(saved) => outcome.saved.push(saved),
                Err(StoreError::UniqueViolation) => {
                    debug!(url = %record.url, "Lost insert race, counting as duplicate");
                    outcome.skipped += 1;
                }
                Err(e) => return Err(persistence_error(e)),
            }
        }

        Ok(())
    }
}

fn persistence_error(err: StoreError) -> CrawlError {
    CrawlError::Persistence { source: err.into() }
}

/// Streaming sink for one strategy's crawl. Keeps running totals.
pub struct IngestSink {
    strategy: String,
    ingestor: JobIngestor,
    metrics: Metrics,
    saved: AtomicUsize,
    skipped: AtomicUsize,
}

impl IngestSink {
    pub fn new(strategy: impl Into<String>, ingestor: JobIngestor, metrics: Metrics) -> Self {
        Self {
            strategy: strategy.into(),
            ingestor,
            metrics,
            saved: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchSink for IngestSink {
    async fn accept(&self, batch: &[JobRecord]) -> Result<()> {
        let mut outcome = PersistOutcome::default();
        let result = self.ingestor.persist_batch_into(batch, &mut outcome).await;

        let saved = outcome.saved.len();
        self.saved.fetch_add(saved, Ordering::SeqCst);
        self.skipped.fetch_add(outcome.skipped, Ordering::SeqCst);
        self.metrics
            .jobs_saved
            .with_label_values(&[self.strategy.as_str()])
            .inc_by(saved as u64);
        self.metrics
            .jobs_skipped
            .with_label_values(&[self.strategy.as_str()])
            .inc_by(outcome.skipped as u64);

        info!(
            strategy = %self.strategy,
            "Ingested batch of {}: {} saved, {} skipped",
            batch.len(),
            saved,
            outcome.skipped
        );
        result?;
        Ok(())
    }
}
