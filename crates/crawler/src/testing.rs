//! Scripted doubles for the browser capability traits and strategies.

use crate::browser::{BrowserSession, LaunchOptions, Page, SessionLauncher};
use crate::strategy::{CrawlStrategy, StrategyOptions};
use anyhow::{bail, Result};
use async_trait::async_trait;
use job_hive_common::JobRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const EMPTY_DOCUMENT: &str = "<html><body></body></html>";

/// URL → HTML served by every fake page
pub type Site = Arc<HashMap<String, String>>;

pub fn site(pages: &[(&str, &str)]) -> Site {
    Arc::new(
        pages
            .iter()
            .map(|(url, html)| (url.to_string(), html.to_string()))
            .collect(),
    )
}

pub fn job(n: usize, source: &str) -> JobRecord {
    JobRecord::new(
        format!("Engineer {n}"),
        "Acme",
        format!("https://{source}.test/jobs/{n}"),
        source,
    )
}

pub struct FakePage {
    site: Site,
    url: Mutex<String>,
    closed: AtomicBool,
    navigations: AtomicUsize,
}

impl FakePage {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            url: Mutex::new("about:blank".to_string()),
            closed: AtomicBool::new(false),
            navigations: AtomicUsize::new(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        if self.is_closed() {
            bail!("page is closed");
        }
        if url.starts_with("unreachable://") {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        self.navigations.fetch_add(1, Ordering::SeqCst);
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    fn current_url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    async fn content(&self) -> Result<String> {
        let url = self.current_url();
        Ok(self
            .site
            .get(&url)
            .cloned()
            .unwrap_or_else(|| EMPTY_DOCUMENT.to_string()))
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(self.site.contains_key(&self.current_url()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSession {
    site: Site,
    primary: Arc<FakePage>,
    pages: Mutex<Vec<Arc<FakePage>>>,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn new(site: Site) -> Self {
        Self {
            primary: Arc::new(FakePage::new(site.clone())),
            site,
            pages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    /// Secondary pages that are still open
    pub fn open_pages(&self) -> usize {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|page| !page.is_closed())
            .count()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn primary_page(&self) -> Arc<dyn Page> {
        self.primary.clone()
    }

    async fn open_page(&self) -> Result<Arc<dyn Page>> {
        if self.is_closed() {
            bail!("browser session is closed");
        }
        let page = Arc::new(FakePage::new(self.site.clone()));
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn close_secondary_pages(&self) -> Result<usize> {
        let pages = self.pages.lock().unwrap();
        let mut closed = 0;
        for page in pages.iter().filter(|page| !page.is_closed()) {
            page.closed.store(true, Ordering::SeqCst);
            closed += 1;
        }
        Ok(closed)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    site: Site,
    sessions: Mutex<Vec<(String, Arc<FakeSession>)>>,
    fail: AtomicBool,
    headless: Mutex<Vec<bool>>,
    delay: Mutex<Duration>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every launch take `delay` before the session exists
    pub fn set_launch_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn launches(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Sessions launched for `key`, oldest first
    pub fn sessions_for(&self, key: &str) -> Vec<Arc<FakeSession>> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, session)| session.clone())
            .collect()
    }

    /// `headless` flag of every launch, in order
    pub fn headless_flags(&self) -> Vec<bool> {
        self.headless.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self, key: &str, options: &LaunchOptions) -> Result<Arc<dyn BrowserSession>> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("chrome exited with status 127");
        }
        let session = Arc::new(FakeSession::new(self.site.clone()));
        self.sessions
            .lock()
            .unwrap()
            .push((key.to_string(), session.clone()));
        self.headless.lock().unwrap().push(options.headless);
        Ok(session)
    }
}

/// Strategy returning a fixed record list, optionally failing or waiting on a gate
pub struct StaticStrategy {
    name: String,
    records: Vec<JobRecord>,
    fail: bool,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(Option<String>, usize, bool)>>,
}

impl StaticStrategy {
    pub fn new(name: &str, records: Vec<JobRecord>) -> Self {
        Self {
            name: name.to_string(),
            records,
            fail: false,
            gate: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    /// Block every crawl until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (keyword, max_results, sink configured) of every call
    pub fn seen(&self) -> Vec<(Option<String>, usize, bool)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrawlStrategy for StaticStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn crawl(&self, page: Arc<dyn Page>, options: StrategyOptions) -> Result<Vec<JobRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((
            options.keyword.clone(),
            options.max_results,
            options.sink.is_some(),
        ));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            bail!("listing selector did not match");
        }

        page.navigate(&format!("https://{}.test/", self.name)).await?;

        match options.sink {
            Some(sink) => {
                sink.accept(&self.records).await?;
                Ok(Vec::new())
            }
            None => Ok(self.records.clone()),
        }
    }
}
