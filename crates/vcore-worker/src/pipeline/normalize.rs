//! Stage 1: Normalize (§4.D.1).

use vcore_models::VideoId;

use crate::error::{WorkerError, WorkerResult};
use crate::paths;
use crate::pipeline::PipelineContext;
use crate::retry::{retry_transient, RetryConfig};

pub async fn run(ctx: &PipelineContext, video_id: &VideoId) -> WorkerResult<()> {
    let video = ctx.storage.fetch_video(video_id).await?;

    let normalized = paths::normalized_path(&ctx.config.data_dir, video_id.as_str());
    if normalized.exists() && video.normalized_path.is_some() {
        return Ok(());
    }

    let input = paths::original_path(&ctx.config.data_dir, &video.original_path);
    if !input.exists() {
        return Err(WorkerError::fatal_input(format!(
            "original video not found at {}",
            input.display()
        )));
    }

    let audio = paths::audio_path(&ctx.config.data_dir, video_id.as_str());
    let retry = RetryConfig::new("transcode");
    let output = retry_transient(&retry, || async {
        ctx.transcoder
            .transcode(&input, &normalized, &audio)
            .await
            .map_err(WorkerError::from)
    })
    .await?;

    ctx.storage
        .update_video_normalized(
            video_id,
            &output.normalized_path.to_string_lossy(),
            output.duration_sec,
        )
        .await?;

    Ok(())
}
