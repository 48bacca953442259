//! Bulk deletion: batched or one-shot fast clear.

use catalog_core::bulk_delete::{DeleteStrategy, ProductFilter};
use catalog_core::job::Job;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::JobFailure;
use crate::retry::with_retry;
use crate::runner::{JobRunner, Outcome};

pub(crate) async fn run_delete(
    runner: &JobRunner,
    job: &mut Job,
    filter: &ProductFilter,
    strategy: DeleteStrategy,
    cancel: &CancellationToken,
) -> Result<Outcome, JobFailure> {
    if strategy.is_batched() {
        run_batched(runner, job, filter, cancel).await
    } else {
        run_fast_clear(runner, job, filter).await
    }
}

/// Delete `Dbatch` rows per transaction until a short batch shows nothing
/// is left. Cancellation is checked between batches.
async fn run_batched(
    runner: &JobRunner,
    job: &mut Job,
    filter: &ProductFilter,
    cancel: &CancellationToken,
) -> Result<Outcome, JobFailure> {
    let batch_size = runner.config().delete_batch_size;
    let mut batch_no = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::info!(job_id = job.id, processed = job.processed, "Delete cancelled");
            return Ok(Outcome::Cancelled);
        }

        let deleted = with_retry(runner.retry(), job.id, "delete batch", || {
            runner.catalog().delete_batch(filter, batch_size)
        })
        .await?;
        batch_no += 1;

        if deleted > 0 {
            job.advance(deleted as i64, Utc::now());
            runner.checkpoint(job).await?;
            tracing::debug!(
                job_id = job.id,
                batch = batch_no,
                deleted,
                processed = job.processed,
                "Delete batch committed",
            );
        }

        if (deleted as i64) < batch_size {
            return Ok(Outcome::Completed);
        }

        tokio::task::yield_now().await;
    }
}

/// One irreversible clear, bracketed by a start event published here and
/// the terminal one published by the runner.
async fn run_fast_clear(
    runner: &JobRunner,
    job: &mut Job,
    filter: &ProductFilter,
) -> Result<Outcome, JobFailure> {
    runner.checkpoint(job).await?;

    let removed = with_retry(runner.retry(), job.id, "fast clear", || {
        runner.catalog().clear(filter)
    })
    .await?;

    job.advance(removed as i64, Utc::now());
    tracing::info!(job_id = job.id, removed, scope = %filter.describe(), "Fast clear committed");
    Ok(Outcome::Completed)
}
