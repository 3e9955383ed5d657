use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use super::Store;
use crate::error::StoreError;
use crate::models::job::{DedupKey, JobRecord, Salary};
use crate::models::source::{FetchHints, ParserKind, SourceBookkeeping, SourceDescriptor};

const SOURCE_COLUMNS: &str = "id, name, url, kind, parser, is_active, scrape_interval_minutes, hints, last_scraped_at, last_success_at, last_error";

const JOB_COLUMNS: &str = "id, source_id, external_id, id_origin, external_url, title, description, company, location, salary_min, salary_max, salary_currency, employment_type, status, published_at, scraped_at";

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    id: i32,
    name: String,
    url: String,
    kind: String,
    parser: Option<String>,
    is_active: bool,
    scrape_interval_minutes: i32,
    hints: Json<FetchHints>,
    last_scraped_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TryFrom<SourceRow> for SourceDescriptor {
    type Error = StoreError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        Ok(SourceDescriptor {
            id: row.id,
            name: row.name,
            url: row.url,
            kind: row.kind.parse().map_err(StoreError::Corrupt)?,
            parser: row
                .parser
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(str::parse::<ParserKind>)
                .transpose()
                .map_err(StoreError::Corrupt)?,
            is_active: row.is_active,
            scrape_interval_minutes: row.scrape_interval_minutes,
            hints: row.hints.0,
            last_scraped_at: row.last_scraped_at,
            last_success_at: row.last_success_at,
            last_error: row.last_error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i32,
    source_id: i32,
    external_id: String,
    id_origin: String,
    external_url: Option<String>,
    title: String,
    description: String,
    company: Option<String>,
    location: Option<String>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_currency: Option<String>,
    employment_type: String,
    status: String,
    published_at: Option<DateTime<Utc>>,
    scraped_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let salary = match (row.salary_min, row.salary_max, row.salary_currency) {
            (Some(min), Some(max), Some(currency)) => Some(Salary { min, max, currency }),
            _ => None,
        };
        Ok(JobRecord {
            id: Some(row.id),
            source_id: row.source_id,
            external_id: row.external_id,
            id_origin: row.id_origin.parse().map_err(StoreError::Corrupt)?,
            external_url: row.external_url,
            title: row.title,
            description: row.description,
            company: row.company,
            location: row.location,
            salary,
            employment_type: row.employment_type.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            published_at: row.published_at,
            scraped_at: row.scraped_at,
        })
    }
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_active_sources(&self) -> Result<Vec<SourceDescriptor>, StoreError> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        // One corrupt row must not hide every other source from the scheduler.
        let mut sources = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match SourceDescriptor::try_from(row) {
                Ok(source) => sources.push(source),
                Err(e) => tracing::error!(source_id = id, "Skipping unreadable source: {e}"),
            }
        }
        Ok(sources)
    }

    async fn get_source(&self, id: i32) -> Result<Option<SourceDescriptor>, StoreError> {
        sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(SourceDescriptor::try_from)
        .transpose()
    }

    async fn update_source_bookkeeping(
        &self,
        id: i32,
        update: &SourceBookkeeping,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sources SET
                 last_scraped_at = $2,
                 last_success_at = COALESCE($3, last_success_at),
                 last_error = CASE WHEN $4 THEN $5 ELSE last_error END,
                 is_active = COALESCE($6, is_active),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.last_scraped_at)
        .bind(update.last_success_at)
        .bind(update.last_error.is_some())
        .bind(update.last_error.clone().flatten())
        .bind(update.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("source {id} does not exist")));
        }
        Ok(())
    }

    async fn find_job_by_dedup_key(
        &self,
        source_id: i32,
        key: &DedupKey,
    ) -> Result<Option<JobRecord>, StoreError> {
        let query = match key {
            DedupKey::ExternalId(_) => format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE source_id = $1 AND external_id = $2"
            ),
            DedupKey::Title(_) => format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE source_id = $1
                   AND lower(regexp_replace(btrim(title), '\\s+', ' ', 'g')) = $2
                 ORDER BY id LIMIT 1"
            ),
        };
        let value = match key {
            DedupKey::ExternalId(v) | DedupKey::Title(v) => v,
        };

        sqlx::query_as::<_, JobRow>(&query)
            .bind(source_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(JobRecord::try_from)
            .transpose()
    }

    async fn upsert_job(&self, job: &JobRecord) -> Result<i32, StoreError> {
        let salary = job.salary.as_ref();

        // Updates go by storage id so a title-matched record keeps its
        // original external id.
        if let Some(id) = job.id {
            let updated = sqlx::query_as::<_, (i32,)>(
                "UPDATE jobs SET
                     external_url = $3, title = $4, description = $5, company = $6,
                     location = $7, salary_min = $8, salary_max = $9, salary_currency = $10,
                     employment_type = $11, status = $12, published_at = $13, scraped_at = $14,
                     updated_at = NOW()
                 WHERE id = $1 AND source_id = $2
                 RETURNING id",
            )
            .bind(id)
            .bind(job.source_id)
            .bind(&job.external_url)
            .bind(&job.title)
            .bind(&job.description)
            .bind(&job.company)
            .bind(&job.location)
            .bind(salary.map(|s| s.min))
            .bind(salary.map(|s| s.max))
            .bind(salary.map(|s| s.currency.as_str()))
            .bind(job.employment_type.as_str())
            .bind(job.status.as_str())
            .bind(job.published_at)
            .bind(job.scraped_at)
            .fetch_optional(&self.pool)
            .await?;

            return updated.map(|(id,)| id).ok_or_else(|| {
                StoreError::Rejected(format!("job {id} vanished before it could be updated"))
            });
        }

        // Concurrent inserts of the same key collapse onto one row.
        let (id,) = sqlx::query_as::<_, (i32,)>(
            "INSERT INTO jobs (source_id, external_id, id_origin, external_url, title,
                 description, company, location, salary_min, salary_max, salary_currency,
                 employment_type, status, published_at, scraped_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (source_id, external_id) DO UPDATE SET
                 external_url = EXCLUDED.external_url, title = EXCLUDED.title,
                 description = EXCLUDED.description,
                 company = COALESCE(EXCLUDED.company, jobs.company),
                 location = EXCLUDED.location, salary_min = EXCLUDED.salary_min,
                 salary_max = EXCLUDED.salary_max, salary_currency = EXCLUDED.salary_currency,
                 employment_type = EXCLUDED.employment_type, status = EXCLUDED.status,
                 published_at = COALESCE(EXCLUDED.published_at, jobs.published_at),
                 scraped_at = EXCLUDED.scraped_at, updated_at = NOW()
             RETURNING id",
        )
        .bind(job.source_id)
        .bind(&job.external_id)
        .bind(job.id_origin.as_str())
        .bind(&job.external_url)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.company)
        .bind(&job.location)
        .bind(salary.map(|s| s.min))
        .bind(salary.map(|s| s.max))
        .bind(salary.map(|s| s.currency.as_str()))
        .bind(job.employment_type.as_str())
        .bind(job.status.as_str())
        .bind(job.published_at)
        .bind(job.scraped_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}
