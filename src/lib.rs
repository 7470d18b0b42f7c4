//! # Job Hive
//!
//! Job Hive periodically collects job postings from several job boards with a
//! bounded pool of headless Chrome sessions, normalizes them into one record
//! shape and stores them without duplicates.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use job_hive::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Every setting has a default; see AppConfig::from_env for the variables
//!     let config = AppConfig::from_env();
//!
//!     // Serves the HTTP API and runs the cron scheduler until SIGINT/SIGTERM
//!     run_server(config).await
//! }
//! ```
//!
//! ## Architecture
//!
//! Job Hive consists of:
//! - **Crawler**: session pool, strategies, orchestrator, ingestion, scheduler, HTTP API
//! - **Common**: shared records, configuration, errors and utilities
//!
//! ## Features
//!
//! - `crawler` (default): Include crawler functionality
//!
//! Use `default-features = false` to include only the shared types.

/// Re-export of common types
pub use job_hive_common as common;

/// Re-export of crawler functionality
#[cfg(feature = "crawler")]
pub use job_hive_crawler as crawler;

/// Convenient re-exports of commonly used types
pub mod prelude {
    // Records and errors
    pub use crate::common::{CrawlError, JobRecord, PersistOutcome, PersistedJob};

    // Configuration types
    pub use crate::common::{AppConfig, CrawlConfig, PoolConfig, SchedulerConfig, ServerConfig};

    // Crawler functionality
    #[cfg(feature = "crawler")]
    pub use crate::crawler::{
        run_server, BatchSink, CrawlOptions, CrawlOrchestrator, CrawlStrategy, JobIngestor,
        JobStore, ScheduledRunner, SessionPool, StrategyOptions, StrategyRegistry,
    };
}
