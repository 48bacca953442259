//! Row model for the `jobs` table.

use catalog_core::bulk_delete::DeleteStrategy;
use catalog_core::catalog_import::RowError;
use catalog_core::error::StoreError;
use catalog_core::job::{Job, JobKind, JobPhase};
use catalog_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::{JobStatusId, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub kind: String,
    pub status_id: StatusId,
    pub phase: String,
    pub strategy: Option<String>,
    pub source: Option<String>,
    pub total: Option<i64>,
    pub processed: i64,
    pub error_count: i64,
    pub row_errors: Json<Vec<RowError>>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            StoreError::Unavailable(format!("Job {} has unknown {field} '{value}'", row.id))
        };

        let kind = JobKind::parse(&row.kind).ok_or_else(|| corrupt("kind", &row.kind))?;
        let status = JobStatusId::from_id(row.status_id)
            .ok_or_else(|| corrupt("status_id", &row.status_id.to_string()))?
            .into();
        let phase = JobPhase::parse(&row.phase).ok_or_else(|| corrupt("phase", &row.phase))?;
        let strategy = match row.strategy.as_deref() {
            Some(s) => Some(DeleteStrategy::parse(s).ok_or_else(|| corrupt("strategy", s))?),
            None => None,
        };

        Ok(Job {
            id: row.id,
            kind,
            status,
            phase,
            strategy,
            source: row.source,
            total: row.total,
            processed: row.processed,
            error_count: row.error_count,
            row_errors: row.row_errors.0,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            updated_at: row.updated_at,
        })
    }
}
