//! Executes one job task from claim to terminal snapshot.

use std::sync::Arc;

use catalog_core::bulk_delete::{DeleteStrategy, ProductFilter};
use catalog_core::config::EngineConfig;
use catalog_core::error::StoreError;
use catalog_core::job::{Job, JobPhase, JobStatus};
use catalog_core::store::CatalogStore;
use catalog_core::types::DbId;
use catalog_events::ProgressBroadcaster;
use chrono::Utc;

use crate::cancel::CancellationRegistry;
use crate::csv_reader::ImportSource;
use crate::retry::{with_retry, RetryPolicy};
use crate::{deletion, importer};

/// Unit of work handed from the coordinator to an executor.
#[derive(Debug, Clone)]
pub struct JobTask {
    pub job_id: DbId,
    pub payload: TaskPayload,
}

#[derive(Debug, Clone)]
pub enum TaskPayload {
    Import {
        source: ImportSource,
        batch_size: usize,
    },
    Delete {
        filter: ProductFilter,
        strategy: DeleteStrategy,
    },
}

impl TaskPayload {
    fn phase(&self) -> JobPhase {
        match self {
            Self::Import { .. } => JobPhase::Importing,
            Self::Delete {
                strategy: DeleteStrategy::FastClear,
                ..
            } => JobPhase::FastClear,
            Self::Delete { .. } => JobPhase::Deleting,
        }
    }
}

/// How a job body ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Cancelled,
}

/// Shared execution context for every job, whichever task runs it.
pub struct JobRunner {
    config: Arc<EngineConfig>,
    catalog: Arc<dyn CatalogStore>,
    broadcaster: ProgressBroadcaster,
    cancellations: Arc<CancellationRegistry>,
    retry: RetryPolicy,
    terminal_retry: RetryPolicy,
}

impl JobRunner {
    pub fn new(
        config: Arc<EngineConfig>,
        catalog: Arc<dyn CatalogStore>,
        broadcaster: ProgressBroadcaster,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        let terminal_retry = RetryPolicy::for_terminal(&config);
        Self {
            config,
            catalog,
            broadcaster,
            cancellations,
            retry,
            terminal_retry,
        }
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn catalog(&self) -> &dyn CatalogStore {
        self.catalog.as_ref()
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `task` to a terminal state.
    ///
    /// Returns the final job, or `None` when the task was skipped because
    /// its job was gone or no longer pending. Fails only when the job could
    /// not be claimed; it is then marked failed if the store allows it.
    pub async fn run(&self, task: JobTask) -> Result<Option<Job>, StoreError> {
        let job_id = task.job_id;
        let mut job = match self.claim(job_id, task.payload.phase()).await {
            Ok(Some(job)) => job,
            skipped_or_failed => {
                self.cancellations.remove(job_id);
                return skipped_or_failed;
            }
        };

        tracing::info!(
            job_id,
            kind = %job.kind,
            phase = job.phase.as_str(),
            source = job.source.as_deref().unwrap_or(""),
            "Job started",
        );

        let cancel = self.cancellations.token(job_id);
        let outcome = match task.payload {
            TaskPayload::Import { source, batch_size } => {
                importer::run_import(self, &mut job, source, batch_size, &cancel).await
            }
            TaskPayload::Delete { filter, strategy } => {
                deletion::run_delete(self, &mut job, &filter, strategy, &cancel).await
            }
        };

        let (status, error) = match outcome {
            Ok(Outcome::Completed) => (JobStatus::Succeeded, None),
            Ok(Outcome::Cancelled) => (JobStatus::Cancelled, None),
            Err(e) => {
                tracing::error!(job_id, error = %e, processed = job.processed, "Job failed");
                (JobStatus::Failed, Some(e.to_string()))
            }
        };

        self.finish(&mut job, status, error).await;
        self.cancellations.remove(job_id);
        Ok(Some(job))
    }

    /// Persist the job's current counters and publish them.
    pub(crate) async fn checkpoint(&self, job: &Job) -> Result<(), StoreError> {
        with_retry(&self.retry, job.id, "persist progress", || {
            self.broadcaster.broadcast(job)
        })
        .await
        .map(|_| ())
    }

    /// Persist the job's current state without publishing it.
    pub(crate) async fn save(&self, job: &Job) -> Result<(), StoreError> {
        with_retry(&self.retry, job.id, "persist job", || {
            self.broadcaster.persist(job)
        })
        .await
    }

    /// Move a pending job to running in the store.
    ///
    /// A job that was loaded but could not be marked running is failed
    /// before the error is returned.
    async fn claim(&self, job_id: DbId, phase: JobPhase) -> Result<Option<Job>, StoreError> {
        let jobs = self.broadcaster.jobs();
        let found = with_retry(&self.retry, job_id, "load job", || jobs.find_by_id(job_id)).await?;

        let Some(mut job) = found else {
            tracing::warn!(job_id, "Job vanished before it could start");
            return Ok(None);
        };
        if job.start(phase, Utc::now()).is_err() {
            tracing::warn!(job_id, status = %job.status, "Job is not pending, skipping");
            return Ok(None);
        }

        if let Err(e) = self.save(&job).await {
            tracing::error!(job_id, error = %e, "Failed to mark job running");
            let reason = format!("Job could not be started: {e}");
            self.finish(&mut job, JobStatus::Failed, Some(reason)).await;
            return Err(e);
        }
        Ok(Some(job))
    }

    /// Record the terminal state.
    ///
    /// The write gets the longer terminal budget. If it still fails the
    /// terminal event is published anyway so live subscribers are released.
    async fn finish(&self, job: &mut Job, status: JobStatus, error: Option<String>) {
        if let Err(e) = job.finish(status, error, Utc::now()) {
            tracing::error!(job_id = job.id, error = %e, "Invalid terminal transition");
            return;
        }

        let snapshot: &Job = job;
        let persisted = with_retry(
            &self.terminal_retry,
            snapshot.id,
            "persist terminal snapshot",
            || self.broadcaster.broadcast(snapshot),
        )
        .await;

        match persisted {
            Ok(_) => tracing::info!(
                job_id = job.id,
                status = %job.status,
                processed = job.processed,
                total = ?job.total,
                error_count = job.error_count,
                "Job finished",
            ),
            Err(e) => {
                tracing::error!(
                    job_id = job.id,
                    status = %job.status,
                    attempts = self.terminal_retry.max_attempts,
                    error = %e,
                    "Failed to persist terminal snapshot, publishing it unsaved",
                );
                self.broadcaster.publish(job);
            }
        }
    }
}
