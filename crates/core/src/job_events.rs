//! WebSocket message type constants for job progress frames.
//!
//! Used by the API when forwarding [`ProgressEvent`](crate::progress::ProgressEvent)s
//! to connected clients.

use crate::job::JobStatus;

/// Progress update after a committed batch (or the fast-clear start event).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed after exhausting its retry budget or on a source error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled at a batch boundary.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// Message type for a frame carrying a job in the given status.
pub fn message_type_for(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Succeeded => MSG_TYPE_JOB_COMPLETED,
        JobStatus::Failed => MSG_TYPE_JOB_FAILED,
        JobStatus::Cancelled => MSG_TYPE_JOB_CANCELLED,
        JobStatus::Pending | JobStatus::Running => MSG_TYPE_JOB_PROGRESS,
    }
}
