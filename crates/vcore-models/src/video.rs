//! Video entity: an input media blob and its whole-pipeline completion state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, externally-generated, globally unique identifier for a Video.
///
/// Video rows are produced by the external uploader; the core never mints
/// one itself except in tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random ID — test/fixture use only; the core consumes
    /// IDs the uploader already assigned.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Whole-pipeline completion state for a Video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record identifying an input media blob and tracking pipeline progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    /// Relative filesystem path to the uploaded blob, resolved against the
    /// configured data root.
    pub original_path: String,
    pub status: VideoStatus,
    /// Set after the Normalize stage.
    pub normalized_path: Option<String>,
    /// Set after the Normalize stage.
    pub duration_sec: Option<f64>,
}

impl Video {
    pub fn new(id: VideoId, original_path: impl Into<String>) -> Self {
        Self {
            id,
            original_path: original_path.into(),
            status: VideoStatus::Uploaded,
            normalized_path: None,
            duration_sec: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_roundtrips_through_string() {
        let id = VideoId::from_string("vid-123");
        assert_eq!(id.as_str(), "vid-123");
        assert_eq!(id.to_string(), "vid-123");
    }

    #[test]
    fn new_video_starts_uploaded_with_no_normalized_artifact() {
        let video = Video::new(VideoId::from_string("vid-1"), "uploads/vid-1_clip.mp4");
        assert_eq!(video.status, VideoStatus::Uploaded);
        assert!(video.normalized_path.is_none());
        assert!(video.duration_sec.is_none());
    }
}
