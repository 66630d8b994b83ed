//! Stage 3: Scenes (§4.D.3).

use vcore_models::{Scene, VideoId};

use crate::error::{WorkerError, WorkerResult};
use crate::paths;
use crate::pipeline::PipelineContext;
use crate::retry::{retry_transient, RetryConfig};

pub async fn run(ctx: &PipelineContext, video_id: &VideoId) -> WorkerResult<()> {
    let existing = ctx.storage.scenes_for_video(video_id).await?;
    if !existing.is_empty() {
        return Ok(());
    }

    let normalized = paths::normalized_path(&ctx.config.data_dir, video_id.as_str());
    let retry = RetryConfig::new("detect_scenes");
    let boundaries = retry_transient(&retry, || async {
        ctx.scene_detector
            .detect_scenes(&normalized)
            .await
            .map_err(WorkerError::from)
    })
    .await?;

    let scenes: Vec<Scene> = boundaries
        .into_iter()
        .enumerate()
        .map(|(idx, (t_start, t_end))| Scene::new(video_id.clone(), idx as u32, t_start, t_end))
        .collect();

    ctx.storage.bulk_insert_scenes(&scenes).await?;
    Ok(())
}
