//! Stage 2: Transcribe (§4.D.2).

use vcore_models::{TranscriptSegment, VideoId};

use crate::error::{WorkerError, WorkerResult};
use crate::paths;
use crate::pipeline::PipelineContext;
use crate::retry::{retry_transient, RetryConfig};
use crate::srt::render_srt;

pub async fn run(ctx: &PipelineContext, video_id: &VideoId) -> WorkerResult<()> {
    if !ctx.config.enable_transcription {
        return Ok(());
    }

    let existing = ctx.storage.segments_for_video(video_id).await?;
    if !existing.is_empty() {
        return Ok(());
    }

    let audio = paths::audio_path(&ctx.config.data_dir, video_id.as_str());
    let retry = RetryConfig::new("transcribe");
    let utterances = retry_transient(&retry, || async {
        ctx.transcriber.transcribe(&audio).await.map_err(WorkerError::from)
    })
    .await?;

    let segments: Vec<TranscriptSegment> = utterances
        .into_iter()
        .enumerate()
        .map(|(idx, (t_start, t_end, text))| {
            TranscriptSegment::new(video_id.clone(), idx as u32, t_start, t_end, text)
        })
        .collect();

    ctx.storage.bulk_insert_segments(&segments).await?;

    let srt = render_srt(&segments);
    let sidecar = paths::subs_path(&ctx.config.data_dir, video_id.as_str());
    if let Some(parent) = sidecar.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&sidecar, srt).await?;

    Ok(())
}
