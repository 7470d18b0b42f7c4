use crate::browser::Page;
use anyhow::Result;
use async_trait::async_trait;
use job_hive_common::JobRecord;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Streaming persistence target for extracted batches
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn accept(&self, batch: &[JobRecord]) -> Result<()>;
}

/// Options handed to a strategy. Launch-only settings never reach this point.
#[derive(Clone)]
pub struct StrategyOptions {
    pub keyword: Option<String>,
    pub max_results: usize,
    /// When set, batches are persisted as pages are extracted and the
    /// strategy returns an empty list
    pub sink: Option<Arc<dyn BatchSink>>,
}

impl fmt::Debug for StrategyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyOptions")
            .field("keyword", &self.keyword)
            .field("max_results", &self.max_results)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Per-site extraction adapter
#[async_trait]
pub trait CrawlStrategy: Send + Sync {
    /// Unique registry name
    fn name(&self) -> &str;

    /// Extract job records using `page`. The caller owns the page and closes it.
    async fn crawl(&self, page: Arc<dyn Page>, options: StrategyOptions) -> Result<Vec<JobRecord>>;
}

/// Name → strategy lookup
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn CrawlStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy. A strategy registered under an existing name
    /// replaces the previous one.
    pub fn register(&mut self, strategy: Arc<dyn CrawlStrategy>) {
        let name = strategy.name().to_string();
        if self.strategies.insert(name.clone(), strategy).is_some() {
            warn!(strategy = %name, "Replacing previously registered strategy");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CrawlStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
