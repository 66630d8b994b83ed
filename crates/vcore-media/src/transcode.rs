//! Transcode capability: 720p30 video + 16kHz mono audio.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Output of a successful transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub normalized_path: PathBuf,
    pub audio_path: PathBuf,
    pub duration_sec: f64,
}

/// Writes a normalized 720p/30fps video and a 16kHz mono audio track to
/// derived paths, returning the measured duration.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        normalized_path: &Path,
        audio_path: &Path,
    ) -> MediaResult<TranscodeOutput>;
}

/// Local `ffmpeg` subprocess implementation.
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(600),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        normalized_path: &Path,
        audio_path: &Path,
    ) -> MediaResult<TranscodeOutput> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.display().to_string()));
        }
        if let Some(parent) = normalized_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(input = %input.display(), "transcoding to 720p30");
        let video_cmd = FfmpegCommand::new(input, normalized_path)
            .video_filter("scale=-2:720")
            .video_codec("libx264")
            .frame_rate(30)
            .audio_codec("aac");
        self.runner.run(&video_cmd).await?;

        let audio_cmd = FfmpegCommand::new(input, audio_path)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_rate(16000)
            .audio_channels(1);
        self.runner.run(&audio_cmd).await?;

        let info = probe_video(normalized_path).await?;

        Ok(TranscodeOutput {
            normalized_path: normalized_path.to_path_buf(),
            audio_path: audio_path.to_path_buf(),
            duration_sec: info.duration,
        })
    }
}
