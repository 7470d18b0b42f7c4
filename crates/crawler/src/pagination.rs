//! Extract → ingest → advance loop shared by paginated strategies.

use crate::strategy::StrategyOptions;
use anyhow::Result;
use async_trait::async_trait;
use job_hive_common::JobRecord;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A listing that can be walked page by page
#[async_trait]
pub trait PaginatedSource: Send + Sync {
    /// Initial navigation. Failures abort the crawl.
    async fn load(&self) -> Result<()>;

    /// Every record visible on the current page
    async fn extract(&self) -> Result<Vec<JobRecord>>;

    /// Move to the next page. `Ok(false)` means there is none.
    async fn advance(&self) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// A page yielded no records
    Exhausted,
    NoNextPage,
    AdvanceFailed,
    ExtractionFailed,
}

#[derive(Debug, Clone)]
pub struct PaginationReport {
    /// Accumulated records, truncated to the target. Empty when a sink is used.
    pub records: Vec<JobRecord>,
    pub pages: usize,
    /// Records extracted across all pages, before truncation
    pub extracted: usize,
    pub stop: StopReason,
}

pub struct PaginationDriver {
    page_delay: Duration,
}

impl PaginationDriver {
    pub fn new(page_delay: Duration) -> Self {
        Self { page_delay }
    }

    /// Walk `source` until `options.max_results` records were extracted, a page
    /// comes back empty, or advancing fails. Each page batch goes to the sink
    /// as soon as it is extracted.
    pub async fn run(
        &self,
        strategy: &str,
        source: &dyn PaginatedSource,
        options: &StrategyOptions,
    ) -> Result<PaginationReport> {
        let target = options.max_results;
        let mut records = Vec::new();
        let mut total = 0;
        let mut pages = 0;
        let mut stop = StopReason::TargetReached;

        source.load().await?;

        while total < target {
            let batch = match source.extract().await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(strategy = %strategy, page = pages + 1, "Extraction failed: {:#}", e);
                    stop = StopReason::ExtractionFailed;
                    break;
                }
            };
            pages += 1;

            if batch.is_empty() {
                debug!(strategy = %strategy, page = pages, "Page yielded no records");
                stop = StopReason::Exhausted;
                break;
            }

            total += batch.len();
            match &options.sink {
                Some(sink) => {
                    if let Err(e) = sink.accept(&batch).await {
                        error!(
                            strategy = %strategy,
                            page = pages,
                            "Failed to ingest batch of {}: {:#}",
                            batch.len(),
                            e
                        );
                    }
                }
                None => records.extend(batch),
            }

            if total >= target {
                break;
            }

            match source.advance().await {
                Ok(true) => {}
                Ok(false) => {
                    stop = StopReason::NoNextPage;
                    break;
                }
                Err(e) => {
                    warn!(strategy = %strategy, page = pages, "Failed to advance: {:#}", e);
                    stop = StopReason::AdvanceFailed;
                    break;
                }
            }

            tokio::time::sleep(self.page_delay).await;
        }

        records.truncate(target);
        info!(
            strategy = %strategy,
            "Pagination stopped ({:?}) after {} page(s), {} record(s) extracted",
            stop,
            pages,
            total
        );

        Ok(PaginationReport {
            records,
            pages,
            extracted: total,
            stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BatchSink;
    use crate::testing::job;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Serves fixed page sizes; `None` makes extraction fail on that page
    struct ScriptedSource {
        pages: Vec<Option<usize>>,
        current: AtomicUsize,
        extractions: AtomicUsize,
        fail_load: bool,
        fail_advance: bool,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Option<usize>>) -> Self {
            Self {
                pages,
                current: AtomicUsize::new(0),
                extractions: AtomicUsize::new(0),
                fail_load: false,
                fail_advance: false,
            }
        }

        fn uniform(size: usize, count: usize) -> Self {
            Self::new(vec![Some(size); count])
        }
    }

    #[async_trait]
    impl PaginatedSource for ScriptedSource {
        async fn load(&self) -> Result<()> {
            if self.fail_load {
                anyhow::bail!("navigation timed out");
            }
            Ok(())
        }

        async fn extract(&self) -> Result<Vec<JobRecord>> {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            let page = self.current.load(Ordering::SeqCst);
            match self.pages.get(page) {
                Some(Some(size)) => Ok((0..*size).map(|n| job(page * 100 + n, "scripted")).collect()),
                Some(None) => anyhow::bail!("selector timed out"),
                None => Ok(Vec::new()),
            }
        }

        async fn advance(&self) -> Result<bool> {
            if self.fail_advance {
                anyhow::bail!("next button detached");
            }
            let next = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(next < self.pages.len())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        batches: Mutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait]
    impl BatchSink for CountingSink {
        async fn accept(&self, batch: &[JobRecord]) -> Result<()> {
            self.batches.lock().unwrap().push(batch.len());
            if self.fail {
                anyhow::bail!("database unavailable");
            }
            Ok(())
        }
    }

    fn options(max_results: usize, sink: Option<Arc<dyn BatchSink>>) -> StrategyOptions {
        StrategyOptions {
            keyword: None,
            max_results,
            sink,
        }
    }

    fn driver() -> PaginationDriver {
        PaginationDriver::new(Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_every_page_until_target() {
        let source = ScriptedSource::uniform(10, 5);
        let sink = Arc::new(CountingSink::default());

        let report = driver()
            .run("scripted", &source, &options(25, Some(sink.clone())))
            .await
            .unwrap();

        assert_eq!(source.extractions.load(Ordering::SeqCst), 3);
        assert_eq!(*sink.batches.lock().unwrap(), vec![10, 10, 10]);
        assert_eq!(report.extracted, 30);
        assert_eq!(report.stop, StopReason::TargetReached);
        assert!(report.records.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_target_stops_without_advancing() {
        let source = ScriptedSource::new(vec![Some(10), Some(10), Some(5), Some(10)]);
        let sink = Arc::new(CountingSink::default());

        let report = driver()
            .run("scripted", &source, &options(25, Some(sink.clone())))
            .await
            .unwrap();

        assert_eq!(source.extractions.load(Ordering::SeqCst), 3);
        assert_eq!(*sink.batches.lock().unwrap(), vec![10, 10, 5]);
        assert_eq!(report.extracted, 25);
        assert_eq!(report.stop, StopReason::TargetReached);
        // Two advances reach the third page; none after it
        assert_eq!(source.current.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_sink_truncates_to_target() {
        let source = ScriptedSource::uniform(10, 5);

        let report = driver()
            .run("scripted", &source, &options(25, None))
            .await
            .unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.records.len(), 25);
        assert_eq!(report.extracted, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_stops() {
        let source = ScriptedSource::new(vec![Some(4), Some(0), Some(4)]);

        let report = driver()
            .run("scripted", &source, &options(100, None))
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.records.len(), 4);
        assert_eq!(report.pages, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_page_stops_with_no_next_page() {
        let source = ScriptedSource::uniform(3, 2);

        let report = driver()
            .run("scripted", &source, &options(100, None))
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::NoNextPage);
        assert_eq!(report.records.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_ends_loop_keeping_earlier_pages() {
        let source = ScriptedSource::new(vec![Some(5), None, Some(5)]);

        let report = driver()
            .run("scripted", &source, &options(100, None))
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::ExtractionFailed);
        assert_eq!(report.records.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_failure_stops() {
        let mut source = ScriptedSource::uniform(5, 3);
        source.fail_advance = true;

        let report = driver()
            .run("scripted", &source, &options(100, None))
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::AdvanceFailed);
        assert_eq!(report.pages, 1);
    }

    #[tokio::test]
    async fn test_load_failure_propagates() {
        let mut source = ScriptedSource::uniform(5, 3);
        source.fail_load = true;

        let result = driver().run("scripted", &source, &options(10, None)).await;

        assert!(result.is_err());
        assert_eq!(source.extractions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_abort() {
        let source = ScriptedSource::uniform(10, 5);
        let sink = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });

        let report = driver()
            .run("scripted", &source, &options(25, Some(sink.clone())))
            .await
            .unwrap();

        assert_eq!(sink.batches.lock().unwrap().len(), 3);
        assert_eq!(report.stop, StopReason::TargetReached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_page_delay_between_pages() {
        let source = ScriptedSource::uniform(10, 5);
        let start = tokio::time::Instant::now();

        PaginationDriver::new(Duration::from_millis(1500))
            .run("scripted", &source, &options(25, None))
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(4500));
    }
}
