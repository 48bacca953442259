//! Streaming CSV import.
//!
//! Counts the source once to fix `total`, then reads, normalises and
//! upserts one batch at a time. Row errors are tallied on the job and
//! never stop the import.

use catalog_core::catalog_import::dedupe_by_key;
use catalog_core::job::Job;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::csv_reader::{count_rows, CsvBatchReader, ImportSource};
use crate::error::JobFailure;
use crate::retry::with_retry;
use crate::runner::{JobRunner, Outcome};

pub(crate) async fn run_import(
    runner: &JobRunner,
    job: &mut Job,
    source: ImportSource,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<Outcome, JobFailure> {
    let total = count_rows(source.clone()).await?;
    job.set_total(total as i64);
    // Subscribers first see `total` with the first committed batch.
    runner.save(job).await?;

    let mut reader = CsvBatchReader::open(source, batch_size).await?;
    if !reader.columns().has_sku() {
        tracing::warn!(job_id = job.id, "CSV header has no sku column, every row will fail");
    }

    let mut batch_no = 0u32;
    loop {
        if cancel.is_cancelled() {
            tracing::info!(job_id = job.id, processed = job.processed, "Import cancelled");
            return Ok(Outcome::Cancelled);
        }

        let Some(batch) = reader.next_batch().await? else {
            break;
        };
        batch_no += 1;

        let rows = dedupe_by_key(batch.rows);
        let written = with_retry(runner.retry(), job.id, "upsert batch", || {
            runner.catalog().upsert_batch(&rows)
        })
        .await?;

        let row_errors = batch.errors.len();
        job.record_row_errors(batch.errors, runner.config().max_error_records);
        job.advance(batch.consumed as i64, Utc::now());
        runner.checkpoint(job).await?;

        tracing::debug!(
            job_id = job.id,
            batch = batch_no,
            rows = batch.consumed,
            written,
            row_errors,
            processed = job.processed,
            "Import batch committed",
        );

        tokio::task::yield_now().await;
    }

    Ok(Outcome::Completed)
}
