//! Frame-extraction capability.

use std::path::Path;

use async_trait::async_trait;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Writes a single JPEG frame at the requested timestamp. Pixel-stable
/// given identical inputs.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(
        &self,
        video_path: &Path,
        timestamp: f64,
        output_path: &Path,
    ) -> MediaResult<()>;
}

pub struct FfmpegFrameExtractor {
    runner: FfmpegRunner,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegFrameExtractor {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(60),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(
        &self,
        video_path: &Path,
        timestamp: f64,
        output_path: &Path,
    ) -> MediaResult<()> {
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.display().to_string()));
        }
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = FfmpegCommand::new(video_path, output_path)
            .seek(timestamp.max(0.0))
            .single_frame();
        self.runner.run(&cmd).await
    }
}
