use super::{JobStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use job_hive_common::{NewJob, PersistedJob};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local job store used when no database is configured
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<(String, String), PersistedJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_by_url_and_source(
        &self,
        url: &str,
        source: &str,
    ) -> Result<Option<PersistedJob>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&(url.to_string(), source.to_string())).cloned())
    }

    async fn create(&self, job: NewJob) -> Result<PersistedJob, StoreError> {
        let mut jobs = self.jobs.write().await;
        let key = (job.url.clone(), job.source.clone());
        if jobs.contains_key(&key) {
            return Err(StoreError::UniqueViolation);
        }

        let persisted = PersistedJob::from_new(job, Utc::now());
        jobs.insert(key, persisted.clone());
        Ok(persisted)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PersistedJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut recent: Vec<PersistedJob> = jobs.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
