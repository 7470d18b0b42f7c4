use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of a single crawl invocation.
///
/// Duplicate postings are never errors: the ingestion sink counts them as skips.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("strategy '{name}' not found (available: {})", .available.join(", "))]
    StrategyNotFound { name: String, available: Vec<String> },

    #[error("failed to launch browser session '{key}': {source}")]
    SessionLaunch {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("session pool at capacity ({max}) and no idle session can be evicted")]
    CapacityExceeded { max: usize },

    #[error("session '{key}' is already in use")]
    SessionBusy { key: String },

    #[error("failed to open page: {source}")]
    Page {
        #[source]
        source: BoxError,
    },

    #[error("strategy '{strategy}' failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to persist jobs: {source}")]
    Persistence {
        #[source]
        source: BoxError,
    },
}

impl CrawlError {
    pub fn strategy(strategy: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            source: err.into(),
        }
    }
}
