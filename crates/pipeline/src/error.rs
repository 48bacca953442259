use std::path::PathBuf;

use catalog_core::error::StoreError;

/// Source-level import failure. Fails the job immediately, without retry.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("CSV file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("CSV source must include a header row")]
    MissingHeader,

    #[error("Failed to read CSV source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse CSV source: {0}")]
    Csv(#[from] csv::Error),
}

/// Why a running job could not finish successfully.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    /// A batch or snapshot write exhausted its retry budget.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] ImportError),
}
