//! Error types for media operations.

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur invoking a media capability.
///
/// Every variant additionally exposes [`MediaError::is_retryable`], which
/// the pipeline stages use to classify a failure per the error taxonomy
/// (fatal input vs transient infra).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("input file not found: {0}")]
    FileNotFound(String),

    #[error("ffmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("ffprobe command failed: {0}")]
    FfprobeFailed(String),

    #[error("operation timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("remote API request failed: {0}")]
    RequestFailed(String),

    #[error("remote API returned an invalid payload: {0}")]
    InvalidResponse(String),

    #[error("invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            exit_code,
        }
    }

    /// Transient errors are worth retrying inside the stage's own retry
    /// loop; fatal ones should be surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::Timeout(_)
                | MediaError::RequestFailed(_)
                | MediaError::Io(_)
                | MediaError::FfmpegFailed { .. }
                | MediaError::FfprobeFailed(_)
        )
    }
}
