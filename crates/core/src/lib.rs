//! Catalog job engine domain layer.
//!
//! Pure types and logic shared by the store, pipeline and API crates:
//! the job state machine, progress snapshots, CSV row normalisation,
//! deletion strategy selection, product browsing, webhook delivery
//! records, engine configuration and the store traits. Nothing in this
//! crate performs I/O.

pub mod bulk_delete;
pub mod catalog_import;
pub mod config;
pub mod error;
pub mod job;
pub mod job_events;
pub mod product;
pub mod progress;
pub mod store;
pub mod types;
pub mod webhook;
