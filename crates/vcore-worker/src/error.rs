//! Worker error types and the fatal/retryable classification (§7) the
//! orchestrator and job controller rely on.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    FatalInput(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage error: {0}")]
    Storage(#[from] vcore_storage::StorageError),

    #[error("media error: {0}")]
    Media(#[from] vcore_media::MediaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn fatal_input(msg: impl Into<String>) -> Self {
        Self::FatalInput(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// True when the job controller may re-enqueue the job for another
    /// attempt rather than failing it outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Io(_) => true,
            WorkerError::Config(_) | WorkerError::FatalInput(_) | WorkerError::Invariant(_) => {
                false
            }
        }
    }
}
