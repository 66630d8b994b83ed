//! Stage 5: Vision (§4.D.5).

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use vcore_media::VisionCaptioner;
use vcore_models::{CaptionEntities, ControlEntity, Frame, FrameCaption, JobId, TextEntity, VideoId};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::pipeline::PipelineContext;

/// Per-frame attempts before a persistently-invalid caption is skipped.
const MAX_ATTEMPTS_PER_FRAME: u32 = 2;
/// Consecutive captioning failures within a batch before the stage falls
/// back to sequential dispatch for the remaining frames.
const SEQUENTIAL_FALLBACK_THRESHOLD: u32 = 2;

pub async fn run(ctx: &PipelineContext, job_id: &JobId, video_id: &VideoId) -> WorkerResult<()> {
    if !ctx.config.enable_vision_analysis {
        return Ok(());
    }

    let logger = JobLogger::new(job_id.as_str(), video_id.as_str());
    let mut remaining = ctx.storage.frames_missing_caption(video_id).await?;
    if remaining.is_empty() {
        return Ok(());
    }

    let limit = ctx.config.vision_max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut results: Vec<(u32, FrameCaption)> = Vec::new();
    let mut sequential_mode = false;
    let mut consecutive_failures = 0u32;

    while !remaining.is_empty() {
        let batch_size = next_batch_size(remaining.len(), limit, sequential_mode);
        let batch: Vec<Frame> = remaining.drain(0..batch_size).collect();

        let mut set = JoinSet::new();
        for frame in batch {
            let captioner = Arc::clone(&ctx.vision_captioner);
            let permit = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = permit.acquire_owned().await.ok();
                let outcome = caption_with_retry(captioner.as_ref(), &frame).await;
                (frame, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (frame, outcome) = match joined {
                Ok(v) => v,
                Err(_) => continue,
            };

            match outcome {
                Ok(caption) => {
                    consecutive_failures = 0;
                    let entities = CaptionEntities {
                        controls: caption
                            .controls
                            .into_iter()
                            .map(|c| ControlEntity {
                                kind: c.kind,
                                label: c.label,
                                position: c.position,
                            })
                            .collect(),
                        text_on_screen: caption
                            .text_on_screen
                            .into_iter()
                            .map(|t| TextEntity {
                                text: t.text,
                                position: t.position,
                            })
                            .collect(),
                    };
                    let row = FrameCaption::new(
                        video_id.clone(),
                        frame.id.clone(),
                        caption.caption,
                        entities,
                    );
                    results.push((frame.idx, row));
                }
                Err(e) => {
                    consecutive_failures += 1;
                    crate::metrics::record_vision_frame_skipped();
                    logger.warning(&format!(
                        "vision caption failed after retries, skipping frame {}: {}",
                        frame.id, e
                    ));
                }
            }
        }

        if should_fall_back_to_sequential(consecutive_failures) {
            sequential_mode = true;
        }
    }

    results.sort_by_key(|(idx, _)| *idx);
    let captions: Vec<FrameCaption> = results.into_iter().map(|(_, c)| c).collect();
    ctx.storage.bulk_insert_captions(&captions).await?;
    Ok(())
}

async fn caption_with_retry(
    captioner: &dyn VisionCaptioner,
    frame: &Frame,
) -> Result<vcore_media::VisionCaption, vcore_media::MediaError> {
    let path = std::path::Path::new(&frame.path);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match captioner.caption(path).await {
            Ok(caption) => return Ok(caption),
            Err(_) if attempt < MAX_ATTEMPTS_PER_FRAME => continue,
            Err(e) => return Err(e),
        }
    }
}

/// How many frames to dispatch in the next batch: capped at `limit` while
/// healthy, one at a time once `sequential_mode` has tripped.
fn next_batch_size(remaining: usize, limit: usize, sequential_mode: bool) -> usize {
    if sequential_mode {
        1
    } else {
        limit.min(remaining)
    }
}

fn should_fall_back_to_sequential(consecutive_failures: u32) -> bool {
    consecutive_failures >= SEQUENTIAL_FALLBACK_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_capped_at_the_concurrency_limit_while_healthy() {
        assert_eq!(next_batch_size(10, 5, false), 5);
        assert_eq!(next_batch_size(3, 5, false), 3);
    }

    #[test]
    fn batch_size_drops_to_one_once_sequential_mode_has_tripped() {
        assert_eq!(next_batch_size(10, 5, true), 1);
        assert_eq!(next_batch_size(1, 5, true), 1);
    }

    #[test]
    fn fallback_trips_at_the_configured_consecutive_failure_threshold() {
        assert!(!should_fall_back_to_sequential(0));
        assert!(!should_fall_back_to_sequential(1));
        assert!(should_fall_back_to_sequential(SEQUENTIAL_FALLBACK_THRESHOLD));
        assert!(should_fall_back_to_sequential(SEQUENTIAL_FALLBACK_THRESHOLD + 1));
    }
}
