//! Background worker pool.
//!
//! `worker_count` tokio tasks share one unbounded task queue. Each worker
//! runs one job at a time; distinct jobs run concurrently up to the pool
//! size.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::runner::{JobRunner, JobTask};

type TaskReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<JobTask>>>;

pub struct WorkerPool {
    sender: mpsc::UnboundedSender<JobTask>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers on the current runtime.
    pub fn spawn(worker_count: usize, runner: Arc<JobRunner>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: TaskReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        let handles = (0..worker_count.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&runner),
                    shutdown.clone(),
                ))
            })
            .collect();

        tracing::info!(worker_count, "Job worker pool started");

        Self {
            sender,
            shutdown,
            handles: Mutex::new(handles),
        }
    }

    /// Queue a task. Returns it back if the pool has shut down.
    pub fn enqueue(&self, task: JobTask) -> Result<(), JobTask> {
        if self.is_shut_down() {
            return Err(task);
        }
        self.sender.send(task).map_err(|e| e.0)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop dequeuing and wait for every worker to return. Tasks still in
    /// the queue stay pending.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job worker panicked");
            }
        }
        tracing::info!("Job worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    receiver: TaskReceiver,
    runner: Arc<JobRunner>,
    shutdown: CancellationToken,
) {
    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                task = receiver.recv() => task,
            }
        };
        let Some(task) = task else {
            break;
        };

        let job_id = task.job_id;
        tracing::debug!(worker, job_id, "Worker picked up job");
        if let Err(e) = runner.run(task).await {
            tracing::warn!(worker, job_id, error = %e, "Job could not be started");
        }
    }
    tracing::debug!(worker, "Job worker exiting");
}
