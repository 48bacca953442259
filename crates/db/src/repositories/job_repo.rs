//! Repository for the `jobs` table.
//!
//! Status literals go through `JobStatusId`; no magic numbers.

use catalog_core::job::{Job, JobListQuery, NewJob};
use catalog_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::JobRow;
use crate::models::status::{JobStatusId, TERMINAL_STATUSES};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, kind, status_id, phase, strategy, source, \
    total, processed, error_count, row_errors, error, \
    created_at, started_at, finished_at, updated_at";

/// Provides CRUD operations for catalog jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job.
    pub async fn create(pool: &PgPool, input: &NewJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (kind, status_id, phase, strategy, source, total) \
             VALUES ($1, $2, 'queued', $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(input.kind.as_str())
            .bind(JobStatusId::Pending.id())
            .bind(input.strategy.map(|s| s.as_str()))
            .bind(&input.source)
            .bind(input.total)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Write every mutable field of `job` in one statement.
    ///
    /// Returns `false` when the job does not exist or is already terminal,
    /// in which case nothing was written.
    pub async fn update(pool: &PgPool, job: &Job) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, phase = $3, total = $4, processed = $5, \
                 error_count = $6, row_errors = $7, error = $8, \
                 started_at = $9, finished_at = $10, updated_at = $11 \
             WHERE id = $1 AND status_id NOT IN ($12, $13, $14)",
        )
        .bind(job.id)
        .bind(JobStatusId::from(job.status).id())
        .bind(job.phase.as_str())
        .bind(job.total)
        .bind(job.processed)
        .bind(job.error_count)
        .bind(Json(&job.row_errors))
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.updated_at)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List jobs newest first with optional kind/status filters.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<Vec<JobRow>, sqlx::Error> {
        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.kind.is_some() {
            conditions.push(format!("kind = ${bind_idx}"));
            bind_idx += 1;
        }

        if params.status.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, JobRow>(&query);

        if let Some(kind) = params.kind {
            q = q.bind(kind.as_str());
        }
        if let Some(status) = params.status {
            q = q.bind(JobStatusId::from(status).id());
        }

        q = q
            .bind(params.effective_limit())
            .bind(params.effective_offset());

        q.fetch_all(pool).await
    }
}
