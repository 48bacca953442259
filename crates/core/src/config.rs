//! Engine configuration injected into the job coordinator.
//!
//! Built once at startup (the API reads it from the environment) and
//! shared read-only. Engine code never reads process-wide settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bulk_delete::{
    DEFAULT_CONFIRM_PHRASE, DEFAULT_DELETE_BATCH_SIZE, DEFAULT_SYNC_THRESHOLD,
    DEFAULT_TRUNCATE_THRESHOLD,
};
use crate::catalog_import::{DEFAULT_IMPORT_BATCH_SIZE, DEFAULT_MAX_ERROR_RECORDS};
use crate::error::CoreError;

/// Where an import runs after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// On the submitting task; `submit_import` returns once the job is terminal.
    Inline,
    /// Enqueued for the worker pool.
    Background,
}

impl ExecutionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "inline" => Some(Self::Inline),
            "background" => Some(Self::Background),
            _ => None,
        }
    }
}

/// Tunables for imports, deletes, retries and the worker pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows per import batch (`B`).
    pub import_batch_size: usize,
    pub import_execution: ExecutionMode,
    /// Matching count at or above which deletes leave the caller's task (`Tsync`).
    pub delete_sync_threshold: i64,
    /// Matching count at or above which deletes become a fast clear (`Ttruncate`).
    pub delete_truncate_threshold: i64,
    /// Rows per delete batch (`Dbatch`).
    pub delete_batch_size: i64,
    pub delete_confirm_phrase: String,
    /// Per-attempt timeout for one batch against the store.
    pub batch_timeout: Duration,
    /// Attempts per batch before the job fails.
    pub batch_max_attempts: u32,
    /// Linear backoff unit between attempts.
    pub retry_backoff: Duration,
    /// Attempts to persist a job's terminal snapshot.
    pub finish_max_attempts: u32,
    pub worker_count: usize,
    /// Row error details kept on a job.
    pub max_error_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            import_batch_size: DEFAULT_IMPORT_BATCH_SIZE,
            import_execution: ExecutionMode::Background,
            delete_sync_threshold: DEFAULT_SYNC_THRESHOLD,
            delete_truncate_threshold: DEFAULT_TRUNCATE_THRESHOLD,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            delete_confirm_phrase: DEFAULT_CONFIRM_PHRASE.to_string(),
            batch_timeout: Duration::from_secs(30),
            batch_max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            finish_max_attempts: 10,
            worker_count: 4,
            max_error_records: DEFAULT_MAX_ERROR_RECORDS,
        }
    }
}

impl EngineConfig {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.import_batch_size == 0 {
            return Err(CoreError::Validation(
                "Import batch size must be at least 1".to_string(),
            ));
        }
        if self.delete_batch_size < 1 {
            return Err(CoreError::Validation(
                "Delete batch size must be at least 1".to_string(),
            ));
        }
        if self.delete_sync_threshold < 0 {
            return Err(CoreError::Validation(
                "Delete sync threshold must not be negative".to_string(),
            ));
        }
        if self.delete_sync_threshold >= self.delete_truncate_threshold {
            return Err(CoreError::Validation(format!(
                "Delete sync threshold ({}) must be below the truncate threshold ({})",
                self.delete_sync_threshold, self.delete_truncate_threshold
            )));
        }
        if self.delete_confirm_phrase.is_empty() {
            return Err(CoreError::Validation(
                "Delete confirmation phrase must not be empty".to_string(),
            ));
        }
        if self.batch_max_attempts == 0 {
            return Err(CoreError::Validation(
                "Batch attempts must be at least 1".to_string(),
            ));
        }
        if self.finish_max_attempts < self.batch_max_attempts {
            return Err(CoreError::Validation(format!(
                "Terminal snapshot attempts ({}) must not be below batch attempts ({})",
                self.finish_max_attempts, self.batch_max_attempts
            )));
        }
        if self.worker_count == 0 {
            return Err(CoreError::Validation(
                "Worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
