use super::{JobStore, StoreError};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use job_hive_common::{NewJob, PersistedJob};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        info!("Connected to PostgreSQL job store");
        Ok(Self::new(pool))
    }

    /// Create the `jobs` table and its indexes if missing
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                url TEXT NOT NULL,
                source TEXT NOT NULL,
                description TEXT,
                location TEXT,
                salary TEXT,
                tags TEXT[] NOT NULL DEFAULT '{}',
                posted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (url, source)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create jobs table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs (created_at DESC)")
            .execute(&self.pool)
            .await
            .context("Failed to create jobs created_at index")?;

        Ok(())
    }
}

fn job_from_row(r: &PgRow) -> PersistedJob {
    PersistedJob {
        id: r.get("id"),
        title: r.get("title"),
        company: r.get("company"),
        url: r.get("url"),
        source: r.get("source"),
        description: r.get("description"),
        location: r.get("location"),
        salary: r.get("salary"),
        tags: r.get("tags"),
        posted_at: r.get("posted_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find_by_url_and_source(
        &self,
        url: &str,
        source: &str,
    ) -> Result<Option<PersistedJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, company, url, source, description, location, salary,
                   tags, posted_at, created_at, updated_at
            FROM jobs
            WHERE url = $1 AND source = $2
            "#,
        )
        .bind(url)
        .bind(source)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find job by url and source")?;

        Ok(row.as_ref().map(job_from_row))
    }

    async fn create(&self, job: NewJob) -> Result<PersistedJob, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, title, company, url, source, description, location, salary,
                tags, posted_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING id, title, company, url, source, description, location, salary,
                      tags, posted_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.url)
        .bind(&job.source)
        .bind(&job.description)
        .bind(&job.location)
        .bind(&job.salary)
        .bind(&job.tags)
        .bind(job.posted_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(job_from_row(&row)),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::UniqueViolation)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context("Failed to insert job")
                .into()),
        }
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PersistedJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, company, url, source, description, location, salary,
                   tags, posted_at, created_at, updated_at
            FROM jobs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent jobs")?;

        Ok(rows.iter().map(job_from_row).collect())
    }
}
