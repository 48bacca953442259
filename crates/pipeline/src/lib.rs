//! Catalog job execution.
//!
//! [`JobCoordinator`] is the entry point. It creates jobs in a
//! [`JobStore`](catalog_core::store::JobStore), runs them inline or hands
//! them to the [`WorkerPool`], and streams progress from the
//! [`ProgressBus`](catalog_events::ProgressBus). Imports and deletes both
//! advance one batch-scoped transaction at a time with per-batch retry,
//! and observe cancellation only between batches.

pub mod cancel;
pub mod coordinator;
pub mod csv_reader;
pub mod deletion;
pub mod error;
pub mod importer;
pub mod memory;
pub mod retry;
pub mod runner;
pub mod worker;

pub use coordinator::{DeleteSubmission, JobCoordinator};
pub use csv_reader::ImportSource;
pub use error::{ImportError, JobFailure};
pub use memory::{MemoryCatalogStore, MemoryJobStore, MemoryWebhookStore};
pub use runner::{JobRunner, JobTask, TaskPayload};
pub use worker::WorkerPool;
