use crate::browser::{BrowserSession, Page};
use crate::session_pool::{SessionPool, DEFAULT_SESSION_KEY};
use crate::strategy::{BatchSink, StrategyOptions, StrategyRegistry};
use job_hive_common::{CrawlError, JobRecord};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Per-invocation crawl options
#[derive(Clone)]
pub struct CrawlOptions {
    pub keyword: Option<String>,
    /// Falls back to the orchestrator's default when absent or zero
    pub max_results: Option<usize>,
    /// Only used when the pinned session has to be launched
    pub headless: bool,
    pub sink: Option<Arc<dyn BatchSink>>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            keyword: None,
            max_results: None,
            headless: true,
            sink: None,
        }
    }
}

impl fmt::Debug for CrawlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlOptions")
            .field("keyword", &self.keyword)
            .field("max_results", &self.max_results)
            .field("headless", &self.headless)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Closes the per-call page on every exit path. When the crawl future is
/// dropped before `close` runs, the close is handed to a background task.
struct PageGuard {
    page: Option<Arc<dyn Page>>,
    strategy: String,
}

impl PageGuard {
    fn new(page: Arc<dyn Page>, strategy: &str) -> Self {
        Self {
            page: Some(page),
            strategy: strategy.to_string(),
        }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            close_page(&self.strategy, page).await;
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let strategy = std::mem::take(&mut self.strategy);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { close_page(&strategy, page).await });
            }
            Err(_) => warn!(strategy = %strategy, "No runtime left to close crawl page"),
        }
    }
}

async fn close_page(strategy: &str, page: Arc<dyn Page>) {
    if let Err(e) = page.close().await {
        warn!(strategy = %strategy, "Failed to close crawl page: {:#}", e);
    }
}

/// RAII guard that tracks crawls using the pinned session
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn new(in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Binds named strategies to the pool's default session.
///
/// The default session is acquired lazily and stays in use across crawls until
/// `park` hands it back to the pool.
pub struct CrawlOrchestrator {
    pool: Arc<SessionPool>,
    registry: StrategyRegistry,
    default_max_results: usize,
    pinned: Mutex<Option<Arc<dyn BrowserSession>>>,
    in_flight: Arc<AtomicUsize>,
}

impl CrawlOrchestrator {
    pub fn new(pool: Arc<SessionPool>, registry: StrategyRegistry, default_max_results: usize) -> Self {
        info!(
            "Crawl orchestrator ready with {} strategies: {}",
            registry.names().len(),
            registry.names().join(", ")
        );
        Self {
            pool,
            registry,
            default_max_results,
            pinned: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn has_strategy(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Run one strategy in a fresh page of the pinned session
    pub async fn crawl(&self, name: &str, options: CrawlOptions) -> Result<Vec<JobRecord>, CrawlError> {
        let strategy = self
            .registry
            .get(name)
            .ok_or_else(|| CrawlError::StrategyNotFound {
                name: name.to_string(),
                available: self.registry.names(),
            })?;

        let start_time = Instant::now();
        let (page, _in_flight) = self.open_page(options.headless).await?;
        let page_guard = PageGuard::new(page.clone(), name);

        let strategy_options = StrategyOptions {
            keyword: options.keyword,
            max_results: options
                .max_results
                .filter(|n| *n > 0)
                .unwrap_or(self.default_max_results),
            sink: options.sink,
        };
        info!(strategy = %name, "Starting crawl ({:?})", strategy_options);

        let result = strategy.crawl(page, strategy_options).await;
        page_guard.close().await;

        match result {
            Ok(records) => {
                info!(
                    strategy = %name,
                    "Crawl finished with {} record(s) in {}ms",
                    records.len(),
                    start_time.elapsed().as_millis()
                );
                Ok(records)
            }
            Err(e) => {
                error!(strategy = %name, "Crawl failed: {:#}", e);
                Err(CrawlError::strategy(name, e))
            }
        }
    }

    /// Run several strategies one after another. Failing strategies are logged
    /// and recorded as empty results.
    pub async fn crawl_multiple(
        &self,
        names: &[String],
        options: &CrawlOptions,
    ) -> BTreeMap<String, Vec<JobRecord>> {
        let mut results = BTreeMap::new();

        for name in names {
            let records = match self.crawl(name, options.clone()).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(strategy = %name, "Strategy skipped in multi-crawl: {}", e);
                    Vec::new()
                }
            };
            results.insert(name.clone(), records);
        }

        results
    }

    pub async fn crawl_all(&self, options: &CrawlOptions) -> BTreeMap<String, Vec<JobRecord>> {
        self.crawl_multiple(&self.registry.names(), options).await
    }

    /// Hand the pinned session back to the pool so the idle sweep can reclaim
    /// it. Does nothing while a crawl is running. Returns whether the session
    /// was released.
    pub async fn park(&self) -> bool {
        let mut pinned = self.pinned.lock().await;

        let in_flight = self.in_flight.load(Ordering::SeqCst);
        if in_flight > 0 {
            debug!("Not parking session: {} crawl(s) in flight", in_flight);
            return false;
        }

        if pinned.take().is_none() {
            return false;
        }
        self.pool.release(DEFAULT_SESSION_KEY).await;
        debug!("Parked default session");
        true
    }

    /// Drop the pinned session and terminate its browser
    pub async fn shutdown(&self) {
        let mut pinned = self.pinned.lock().await;
        if pinned.take().is_some() {
            self.pool.remove(DEFAULT_SESSION_KEY).await;
        }
    }

    /// Open a page in the pinned session. A session whose browser is gone is
    /// removed from the pool and relaunched once.
    async fn open_page(&self, headless: bool) -> Result<(Arc<dyn Page>, InFlightGuard), CrawlError> {
        let (session, in_flight) = self.ensure_session(headless).await?;
        let e = match session.open_page().await {
            Ok(page) => return Ok((page, in_flight)),
            Err(e) => e,
        };
        drop(in_flight);

        warn!("Default session unusable, relaunching: {:#}", e);
        self.discard(&session).await;

        let (session, in_flight) = self.ensure_session(headless).await?;
        let page = session
            .open_page()
            .await
            .map_err(|e| CrawlError::Page { source: e.into() })?;
        Ok((page, in_flight))
    }

    /// Forget `session` if it is still the pinned one and remove it from the pool
    async fn discard(&self, session: &Arc<dyn BrowserSession>) {
        let mut pinned = self.pinned.lock().await;
        let is_pinned = pinned
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if is_pinned {
            pinned.take();
            self.pool.remove(DEFAULT_SESSION_KEY).await;
        }
    }

    async fn ensure_session(
        &self,
        headless: bool,
    ) -> Result<(Arc<dyn BrowserSession>, InFlightGuard), CrawlError> {
        let mut pinned = self.pinned.lock().await;

        let session = match pinned.as_ref() {
            Some(session) => {
                self.pool.touch(DEFAULT_SESSION_KEY).await;
                session.clone()
            }
            None => {
                let options = self.pool.launch_options(headless);
                let session = self.pool.acquire(DEFAULT_SESSION_KEY, &options).await?;
                *pinned = Some(session.clone());
                session
            }
        };

        Ok((session, InFlightGuard::new(self.in_flight.clone())))
    }
}
