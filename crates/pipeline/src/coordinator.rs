//! Job coordinator: the engine's entry point.
//!
//! Accepts import and delete requests, creates their jobs, decides where
//! they run and answers status, list, cancel and subscribe queries.

use std::sync::Arc;

use catalog_core::bulk_delete::{
    select_strategy, verify_confirm_phrase, DeleteStrategy, ProductFilter,
};
use catalog_core::config::{EngineConfig, ExecutionMode};
use catalog_core::error::CoreError;
use catalog_core::job::{Job, JobListQuery, NewJob};
use catalog_core::progress::ProgressEvent;
use catalog_core::store::{CatalogStore, JobStore};
use catalog_core::types::DbId;
use catalog_events::{ProgressBroadcaster, ProgressBus, ProgressObserver, ProgressStream};
use futures::{future, stream, StreamExt};
use serde::Serialize;

use crate::cancel::{CancelTarget, CancellationRegistry};
use crate::csv_reader::ImportSource;
use crate::runner::{JobRunner, JobTask, TaskPayload};
use crate::worker::WorkerPool;

/// Result of an accepted delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteSubmission {
    pub job_id: DbId,
    pub strategy: DeleteStrategy,
    /// Matching count estimated at submission.
    pub total: i64,
}

pub struct JobCoordinator {
    config: Arc<EngineConfig>,
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogStore>,
    bus: Arc<dyn ProgressBus>,
    runner: Arc<JobRunner>,
    cancellations: Arc<CancellationRegistry>,
    workers: WorkerPool,
}

impl JobCoordinator {
    /// Validate `config` and start the worker pool on the current runtime.
    pub fn new(
        config: EngineConfig,
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogStore>,
        bus: Arc<dyn ProgressBus>,
    ) -> Result<Self, CoreError> {
        Self::with_observer(config, jobs, catalog, bus, None)
    }

    /// Like [`JobCoordinator::new`], also handing every published progress
    /// event to `observer`.
    pub fn with_observer(
        config: EngineConfig,
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogStore>,
        bus: Arc<dyn ProgressBus>,
        observer: Option<Arc<dyn ProgressObserver>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let config = Arc::new(config);

        let cancellations = Arc::new(CancellationRegistry::new());
        let mut broadcaster = ProgressBroadcaster::new(Arc::clone(&jobs), Arc::clone(&bus));
        if let Some(observer) = observer {
            broadcaster = broadcaster.with_observer(observer);
        }
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&config),
            Arc::clone(&catalog),
            broadcaster,
            Arc::clone(&cancellations),
        ));
        let workers = WorkerPool::spawn(config.worker_count, Arc::clone(&runner));

        Ok(Self {
            config,
            jobs,
            catalog,
            bus,
            runner,
            cancellations,
            workers,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an import job and run it according to the execution mode.
    ///
    /// In background mode this returns as soon as the job is queued; in
    /// inline mode, once it is terminal.
    pub async fn submit_import(
        &self,
        source: ImportSource,
        batch_size: Option<usize>,
    ) -> Result<DbId, CoreError> {
        let batch_size = match batch_size {
            Some(0) => {
                return Err(CoreError::Validation(
                    "Batch size must be at least 1".to_string(),
                ))
            }
            Some(size) => size,
            None => self.config.import_batch_size,
        };
        let mode = self.config.import_execution;
        if mode == ExecutionMode::Background {
            self.ensure_accepting()?;
        }

        let job = self.jobs.create(NewJob::import(source.label())).await?;
        tracing::info!(
            job_id = job.id,
            source = %source.label(),
            batch_size,
            mode = ?mode,
            "Import job submitted",
        );

        let task = JobTask {
            job_id: job.id,
            payload: TaskPayload::Import { source, batch_size },
        };
        match mode {
            ExecutionMode::Inline => self.run_detached(task).await?,
            ExecutionMode::Background => self.enqueue(task)?,
        }
        Ok(job.id)
    }

    /// Check the phrase, estimate the matching count, pick a strategy and
    /// create the delete job.
    ///
    /// A synchronous delete has finished when this returns; background and
    /// fast-clear deletes are queued.
    pub async fn submit_delete(
        &self,
        filter: ProductFilter,
        confirm_phrase: &str,
    ) -> Result<DeleteSubmission, CoreError> {
        verify_confirm_phrase(&self.config.delete_confirm_phrase, confirm_phrase)?;

        let filter = filter.normalized();
        let total = self.catalog.count_matching(&filter).await?;
        let strategy = select_strategy(
            total,
            self.config.delete_sync_threshold,
            self.config.delete_truncate_threshold,
        );
        if strategy != DeleteStrategy::Synchronous {
            self.ensure_accepting()?;
        }

        let job = self
            .jobs
            .create(NewJob::delete(filter.describe(), strategy, total))
            .await?;
        tracing::info!(
            job_id = job.id,
            strategy = %strategy,
            total,
            scope = %filter.describe(),
            "Delete job submitted",
        );

        let task = JobTask {
            job_id: job.id,
            payload: TaskPayload::Delete { filter, strategy },
        };
        match strategy {
            DeleteStrategy::Synchronous => self.run_detached(task).await?,
            DeleteStrategy::Background | DeleteStrategy::FastClear => self.enqueue(task)?,
        }

        Ok(DeleteSubmission {
            job_id: job.id,
            strategy,
            total,
        })
    }

    /// Request cooperative cancellation and return the job as it stands.
    /// A terminal job is returned unchanged.
    pub async fn cancel(&self, job_id: DbId) -> Result<Job, CoreError> {
        let job = self.get_status(job_id).await?;
        if job.is_terminal() {
            tracing::debug!(job_id, status = %job.status, "Cancel ignored, job already terminal");
            return Ok(job);
        }

        if self.cancellations.cancel(job_id) == CancelTarget::NotStarted {
            // The job may have finished between the read and the request.
            let current = self.get_status(job_id).await?;
            if current.is_terminal() {
                self.cancellations.remove(job_id);
                tracing::debug!(job_id, status = %current.status, "Job finished before cancel");
                return Ok(current);
            }
            // No worker will pick it up to honour the request.
            if self.workers.is_shut_down() {
                self.cancellations.remove(job_id);
            }
        }
        tracing::info!(job_id, status = %job.status, "Cancellation requested");
        Ok(job)
    }

    pub async fn get_status(&self, job_id: DbId) -> Result<Job, CoreError> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            })
    }

    pub async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>, CoreError> {
        Ok(self.jobs.list(query).await?)
    }

    /// Live progress for `job_id`: the current snapshot, then every later
    /// event up to and including the terminal one.
    pub async fn subscribe(&self, job_id: DbId) -> Result<ProgressStream, CoreError> {
        // Subscribe before reading the snapshot so nothing falls in between.
        let live = self.bus.subscribe(job_id);
        let job = self.get_status(job_id).await?;
        let snapshot = ProgressEvent::from_job(&job);

        if snapshot.is_terminal() {
            return Ok(stream::once(future::ready(snapshot)).boxed());
        }

        // Events already covered by the snapshot are dropped to keep
        // `processed` non-decreasing.
        let floor = snapshot.processed;
        let later = live.filter(move |event| {
            future::ready(event.processed >= floor || event.is_terminal())
        });
        Ok(stream::once(future::ready(snapshot)).chain(later).boxed())
    }

    /// Jobs holding a cancellation token or a parked cancel request.
    pub fn tracked_cancellations(&self) -> usize {
        self.cancellations.len()
    }

    /// Stop the worker pool. Running jobs stop at their next batch
    /// boundary as cancelled; queued jobs stay pending.
    pub async fn shutdown(&self) {
        tracing::info!("Job coordinator shutting down");
        self.cancellations.cancel_all();
        self.workers.shutdown().await;
    }

    fn ensure_accepting(&self) -> Result<(), CoreError> {
        if self.workers.is_shut_down() {
            return Err(CoreError::Conflict(
                "Job engine is shutting down".to_string(),
            ));
        }
        Ok(())
    }

    /// Run `task` on its own tokio task and wait for it.
    ///
    /// The job keeps running to a terminal state even if the caller's
    /// future is dropped.
    async fn run_detached(&self, task: JobTask) -> Result<(), CoreError> {
        let job_id = task.job_id;
        let runner = Arc::clone(&self.runner);
        let handle = tokio::spawn(async move { runner.run(task).await });

        match handle.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => {
                tracing::error!(job_id, error = %e, "Job task panicked");
                Err(CoreError::Internal(format!("Job {job_id} aborted")))
            }
        }
    }

    fn enqueue(&self, task: JobTask) -> Result<(), CoreError> {
        self.workers.enqueue(task).map_err(|task| {
            tracing::error!(job_id = task.job_id, "Worker queue closed, job left pending");
            CoreError::Internal(format!("Job {} could not be queued", task.job_id))
        })
    }
}
