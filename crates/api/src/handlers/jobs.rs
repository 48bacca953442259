//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::Json;
use catalog_core::job::{Job, JobListQuery};
use catalog_core::progress::ProgressEvent;
use catalog_core::types::DbId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/jobs
///
/// Newest first. Optional filters: `kind`, `status`, `limit`, `offset`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<Json<DataResponse<Vec<Job>>>> {
    let jobs = state.coordinator.list_jobs(&params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProgressEvent>>> {
    let job = state.coordinator.get_status(job_id).await?;
    Ok(Json(DataResponse {
        data: ProgressEvent::from_job(&job),
    }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Returns the snapshot at the time of the request. A running job stops
/// at its next batch boundary; a terminal job is left as it is.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProgressEvent>>> {
    let job = state.coordinator.cancel(job_id).await?;
    Ok(Json(DataResponse {
        data: ProgressEvent::from_job(&job),
    }))
}
