mod memory;
mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

use async_trait::async_trait;
use job_hive_common::{NewJob, PersistedJob};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same (url, source) already exists
    #[error("job with this url and source already exists")]
    UniqueViolation,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for job postings. (`url`, `source`) is unique.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find_by_url_and_source(
        &self,
        url: &str,
        source: &str,
    ) -> Result<Option<PersistedJob>, StoreError>;

    /// Insert a job. Reports `UniqueViolation` when the key is already taken.
    async fn create(&self, job: NewJob) -> Result<PersistedJob, StoreError>;

    /// Most recently created jobs first
    async fn list_recent(&self, limit: usize) -> Result<Vec<PersistedJob>, StoreError>;
}
