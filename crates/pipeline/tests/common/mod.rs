#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use catalog_core::config::{EngineConfig, ExecutionMode};
use catalog_core::job::{Job, JobStatus};
use catalog_core::progress::ProgressEvent;
use catalog_core::types::DbId;
use catalog_events::{InProcessBus, ProgressBus, ProgressStream};
use catalog_pipeline::{JobCoordinator, MemoryCatalogStore, MemoryJobStore};

/// Bus that remembers every published event before delivering it.
#[derive(Default)]
pub struct RecordingBus {
    inner: InProcessBus,
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingBus {
    /// Events published for `job_id`, in publish order.
    pub fn events_for(&self, job_id: DbId) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Every non-terminal event published for `job_id`.
    pub fn batch_events_for(&self, job_id: DbId) -> Vec<ProgressEvent> {
        self.events_for(job_id)
            .into_iter()
            .filter(|e| !e.is_terminal())
            .collect()
    }

    /// `(status, processed)` of every event for `job_id`, in publish order.
    pub fn trace_for(&self, job_id: DbId) -> Vec<(JobStatus, i64)> {
        self.events_for(job_id)
            .iter()
            .map(|e| (e.status, e.processed))
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topic_count()
    }
}

impl ProgressBus for RecordingBus {
    fn publish(&self, topic: DbId, event: ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
        self.inner.publish(topic, event);
    }

    fn subscribe(&self, topic: DbId) -> ProgressStream {
        self.inner.subscribe(topic)
    }
}

pub struct TestEngine {
    pub coordinator: JobCoordinator,
    pub jobs: Arc<MemoryJobStore>,
    pub catalog: Arc<MemoryCatalogStore>,
    pub bus: Arc<RecordingBus>,
}

/// Engine config with fast retries and background execution.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        import_execution: ExecutionMode::Background,
        batch_timeout: Duration::from_secs(2),
        batch_max_attempts: 3,
        finish_max_attempts: 10,
        retry_backoff: Duration::from_millis(1),
        worker_count: 2,
        ..EngineConfig::default()
    }
}

pub fn engine(config: EngineConfig) -> TestEngine {
    let jobs = Arc::new(MemoryJobStore::new());
    let catalog = Arc::new(MemoryCatalogStore::new());
    let bus = Arc::new(RecordingBus::default());
    let coordinator =
        JobCoordinator::new(config, jobs.clone(), catalog.clone(), bus.clone()).unwrap();
    TestEngine {
        coordinator,
        jobs,
        catalog,
        bus,
    }
}

/// Poll until the job is terminal, failing the test after five seconds.
pub async fn wait_for_terminal(coordinator: &JobCoordinator, job_id: DbId) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = coordinator.get_status(job_id).await.unwrap();
        if job.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} still {} after 5s",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A CSV with `rows` valid products `SKU-0..`.
pub fn products_csv(rows: usize) -> String {
    let mut csv = String::from("sku,name,description,price,active\n");
    for i in 0..rows {
        csv.push_str(&format!("SKU-{i},Product {i},Item number {i},{i}.99,yes\n"));
    }
    csv
}

pub fn assert_non_decreasing(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].processed <= pair[1].processed,
            "processed went from {} to {}",
            pair[0].processed,
            pair[1].processed
        );
    }
}
