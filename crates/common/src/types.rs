use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job posting as produced by an extraction strategy, before deduplication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub title: String,
    pub company: String,
    pub url: String,
    pub source: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form relative time as shown by the site ("2d", "just now")
    pub posted_at: Option<String>,
}

impl JobRecord {
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            url: url.into(),
            source: source.into(),
            ..Default::default()
        }
    }
}

/// Insert payload handed to a job store. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub title: String,
    pub company: String,
    pub url: String,
    pub source: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub tags: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// A stored job. (`url`, `source`) is unique across all rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedJob {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub url: String,
    pub source: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub tags: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedJob {
    pub fn from_new(job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: job.title,
            company: job.company,
            url: job.url,
            source: job.source,
            description: job.description,
            location: job.location,
            salary: job.salary,
            tags: job.tags,
            posted_at: job.posted_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of persisting one batch
#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    pub saved: Vec<PersistedJob>,
    pub skipped: usize,
}

/// Caller-facing crawl parameters, as accepted by the HTTP trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub strategy: Option<String>,
    pub keyword: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub key: String,
    pub idle: bool,
    pub age_secs: u64,
    pub idle_for_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub size: usize,
    pub max_size: usize,
    pub sessions: Vec<SessionStatus>,
    pub total_sessions_created: u64,
    pub total_sessions_evicted: u64,
}

/// Per-strategy counters for one scheduled round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub saved: usize,
    pub skipped: usize,
    pub error: Option<String>,
}
