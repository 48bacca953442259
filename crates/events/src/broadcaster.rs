//! Persist-then-publish progress broadcasting.
//!
//! The job store is the source of truth: a snapshot is published only
//! after it has been written, so a poller never sees a value older than
//! the last event a subscriber received.

use std::sync::Arc;

use catalog_core::error::StoreError;
use catalog_core::job::Job;
use catalog_core::progress::ProgressEvent;
use catalog_core::store::JobStore;

use crate::bus::ProgressBus;

/// Receives every event the broadcaster publishes, after the bus.
///
/// Called on the job's own task, so implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn observe(&self, event: &ProgressEvent);
}

/// Writes job snapshots to the store and fans them out on the bus.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    jobs: Arc<dyn JobStore>,
    bus: Arc<dyn ProgressBus>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ProgressBroadcaster {
    pub fn new(jobs: Arc<dyn JobStore>, bus: Arc<dyn ProgressBus>) -> Self {
        Self {
            jobs,
            bus,
            observer: None,
        }
    }

    /// Also hand every published event to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Persist `job` as its latest snapshot, then publish it.
    ///
    /// Nothing is published when the write fails; the caller may retry the
    /// whole call.
    pub async fn broadcast(&self, job: &Job) -> Result<ProgressEvent, StoreError> {
        self.persist(job).await?;
        Ok(self.publish(job))
    }

    /// Write `job` to the store without publishing anything.
    pub async fn persist(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.update(job).await
    }

    /// Publish `job`'s snapshot without writing it.
    pub fn publish(&self, job: &Job) -> ProgressEvent {
        let event = ProgressEvent::from_job(job);
        tracing::debug!(
            job_id = job.id,
            status = %job.status,
            processed = job.processed,
            total = ?job.total,
            "Progress broadcast"
        );
        self.bus.publish(job.id, event.clone());
        if let Some(observer) = &self.observer {
            observer.observe(&event);
        }
        event
    }

    pub fn bus(&self) -> &Arc<dyn ProgressBus> {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }
}
