//! Progress snapshots published per committed batch.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobKind, JobPhase, JobStatus};
use crate::types::{DbId, Timestamp};

/// One progress observation for a job.
///
/// The same shape is pushed to live subscribers and returned to pollers,
/// so a client can switch between the two without translating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: DbId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub phase: JobPhase,
    pub processed: i64,
    pub total: Option<i64>,
    pub error_count: i64,
    pub percent: u8,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl ProgressEvent {
    /// Snapshot the job as it stands.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            status: job.status,
            phase: job.phase,
            processed: job.processed,
            total: job.total,
            error_count: job.error_count,
            percent: job.percent(),
            error: job.error.clone(),
            timestamp: job.updated_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
