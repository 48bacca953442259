//! Job entity and its lifecycle state machine.
//!
//! Every catalog mutation (CSV import or bulk delete) is tracked as a
//! [`Job`]. Status moves strictly forward:
//!
//! ```text
//! pending -> running -> { succeeded | failed | cancelled }
//! ```
//!
//! The counters obey `processed <= total` (once `total` is known) and
//! `error_count <= processed`. All mutation goes through the methods on
//! [`Job`] so the executing worker cannot break these rules.

use serde::{Deserialize, Serialize};

use crate::bulk_delete::DeleteStrategy;
use crate::catalog_import::RowError;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of catalog mutation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Import,
    Delete,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "import" => Some(Self::Import),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Succeeded, failed and cancelled are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => next == Self::Running,
            Self::Running => next.is_terminal(),
            Self::Succeeded | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the job is doing as of its latest snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Importing,
    Deleting,
    FastClear,
    Finished,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Importing => "importing",
            Self::Deleting => "deleting",
            Self::FastClear => "fast_clear",
            Self::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "importing" => Some(Self::Importing),
            "deleting" => Some(Self::Deleting),
            "fast_clear" => Some(Self::FastClear),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A tracked catalog mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: DbId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub phase: JobPhase,
    /// Deletion strategy; `None` for imports.
    pub strategy: Option<DeleteStrategy>,
    /// Human label for the source (upload filename, delete scope).
    pub source: Option<String>,
    /// Unknown until the importer has counted the source.
    pub total: Option<i64>,
    pub processed: i64,
    pub error_count: i64,
    /// First row errors, capped at the configured maximum.
    pub row_errors: Vec<RowError>,
    /// Failure detail for failed jobs.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// Fields supplied when a job is created. Everything else starts at its
/// pending default.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub source: Option<String>,
    pub strategy: Option<DeleteStrategy>,
    pub total: Option<i64>,
}

impl NewJob {
    pub fn import(source: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Import,
            source: Some(source.into()),
            strategy: None,
            total: None,
        }
    }

    pub fn delete(scope: impl Into<String>, strategy: DeleteStrategy, total: i64) -> Self {
        Self {
            kind: JobKind::Delete,
            source: Some(scope.into()),
            strategy: Some(strategy),
            total: Some(total),
        }
    }

    /// Materialise the pending job row for the given id.
    pub fn into_job(self, id: DbId, now: Timestamp) -> Job {
        Job {
            id,
            kind: self.kind,
            status: JobStatus::Pending,
            phase: JobPhase::Queued,
            strategy: self.strategy,
            source: self.source,
            total: self.total,
            processed: 0,
            error_count: 0,
            row_errors: Vec::new(),
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `pending -> running`, entering `phase`.
    pub fn start(&mut self, phase: JobPhase, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Running)?;
        self.phase = phase;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record the total once it is known. Never lowers it below `processed`.
    pub fn set_total(&mut self, total: i64) {
        self.total = Some(total.max(self.processed));
    }

    /// Count `rows` as processed, raising `total` if the source turned out
    /// larger than estimated.
    pub fn advance(&mut self, rows: i64, now: Timestamp) {
        self.processed += rows;
        if let Some(total) = self.total {
            if self.processed > total {
                self.total = Some(self.processed);
            }
        }
        self.updated_at = now;
    }

    /// Tally row-level errors, keeping at most `max_records` details.
    pub fn record_row_errors(&mut self, errors: Vec<RowError>, max_records: usize) {
        self.error_count += errors.len() as i64;
        let room = max_records.saturating_sub(self.row_errors.len());
        self.row_errors.extend(errors.into_iter().take(room));
    }

    /// Move into a terminal status. Only valid from `running`.
    pub fn finish(
        &mut self,
        status: JobStatus,
        error: Option<String>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        if !status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "{status} is not a terminal status"
            )));
        }
        self.transition(status)?;
        self.phase = JobPhase::Finished;
        self.error = error;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Completion percentage for progress displays.
    pub fn percent(&self) -> u8 {
        if self.status == JobStatus::Succeeded {
            return 100;
        }
        calculate_percent(self.processed, self.total.unwrap_or(0))
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// `processed / total` as a whole percentage capped at 100.
///
/// With an unknown or empty total the job is either untouched (0) or
/// done with whatever it found (100).
pub fn calculate_percent(processed: i64, total: i64) -> u8 {
    if total <= 0 {
        return if processed > 0 { 100 } else { 0 };
    }
    ((processed.max(0) * 100) / total).min(100) as u8
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Maximum page size for job listing.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Filters for listing jobs, newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub kind: Option<JobKind>,
    pub status: Option<JobStatus>,
    /// Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobListQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.kind.map_or(true, |k| k == job.kind) && self.status.map_or(true, |s| s == job.status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
