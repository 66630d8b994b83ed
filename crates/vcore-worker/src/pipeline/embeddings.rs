//! Stage 6: Embeddings (§4.D.6).

use vcore_models::VideoId;

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::PipelineContext;
use crate::retry::{retry_transient, RetryConfig};

/// Maximum strings sent to the embedding capability in one call.
const BATCH_SIZE: usize = 100;

pub async fn run(ctx: &PipelineContext, video_id: &VideoId) -> WorkerResult<()> {
    if !ctx.config.enable_embeddings {
        return Ok(());
    }

    let segments = ctx.storage.segments_missing_embedding(video_id).await?;
    let captions = ctx.storage.captions_missing_embedding(video_id).await?;
    let retry = RetryConfig::new("embed");

    for chunk in segments.chunks(BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|s| s.text.clone()).collect();
        let vectors = retry_transient(&retry, || async {
            ctx.embedder.embed(&texts).await.map_err(WorkerError::from)
        })
        .await?;
        for (segment, vector) in chunk.iter().zip(vectors) {
            ctx.storage.update_segment_embedding(&segment.id, &vector).await?;
        }
    }

    for chunk in captions.chunks(BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|c| c.caption.clone()).collect();
        let vectors = retry_transient(&retry, || async {
            ctx.embedder.embed(&texts).await.map_err(WorkerError::from)
        })
        .await?;
        for (caption, vector) in chunk.iter().zip(vectors) {
            ctx.storage.update_caption_embedding(&caption.id, &vector).await?;
        }
    }

    Ok(())
}
