//! Stage 4: Frames (§4.D.4) — the one stage with non-trivial algorithmics.

use vcore_media::hamming_distance;
use vcore_models::{Frame, Scene, VideoId};

use crate::error::{WorkerError, WorkerResult};
use crate::paths;
use crate::pipeline::PipelineContext;
use crate::retry::{retry_transient, RetryConfig};

/// The Hamming-distance threshold above which two frames are considered
/// perceptually distinct enough to both keep.
const DEDUP_HAMMING_THRESHOLD: u32 = 6;

/// Picks `k` (or fewer, if `n <= k`) scene indices out of `n`, always
/// including the first and last, otherwise spread as evenly as possible:
/// `round(i * (n-1) / (k-1))` for `i = 0..k`, deduplicated in order.
pub fn select_candidate_indices(n: usize, k: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    if k <= 1 {
        return vec![0];
    }
    if n <= k {
        return (0..n).collect();
    }

    let mut selected = Vec::with_capacity(k);
    for i in 0..k {
        let raw = (i as f64) * ((n - 1) as f64) / ((k - 1) as f64);
        let idx = raw.round() as usize;
        if selected.last() != Some(&idx) {
            selected.push(idx);
        }
    }
    selected
}

/// One candidate frame going through dedup: whether it's a forced
/// endpoint (first/last selected scene), its perceptual hash, and an
/// arbitrary payload carried through to the surviving set.
pub struct Candidate<T> {
    pub is_endpoint: bool,
    pub phash: String,
    pub payload: T,
}

/// Applies the Hamming-distance dedup rule in candidate order. A candidate
/// survives if its hash is farther than the threshold from every
/// already-accepted hash, OR it is a forced endpoint.
pub fn dedup_candidates<T>(candidates: Vec<Candidate<T>>) -> Vec<T> {
    let mut accepted_hashes: Vec<String> = Vec::new();
    let mut accepted: Vec<T> = Vec::new();

    for candidate in candidates {
        let far_enough = accepted_hashes.iter().all(|h| {
            hamming_distance(h, &candidate.phash)
                .map(|d| d > DEDUP_HAMMING_THRESHOLD)
                .unwrap_or(true)
        });

        if candidate.is_endpoint || far_enough {
            accepted_hashes.push(candidate.phash.clone());
            accepted.push(candidate.payload);
        }
    }

    accepted
}

struct Extracted {
    scene: Scene,
    t_frame: f64,
    path: String,
    phash: String,
}

pub async fn run(ctx: &PipelineContext, video_id: &VideoId) -> WorkerResult<()> {
    let existing = ctx.storage.frames_for_video(video_id).await?;
    if !existing.is_empty() {
        return Ok(());
    }

    let scenes = ctx.storage.scenes_for_video(video_id).await?;
    if scenes.is_empty() {
        return Ok(());
    }

    let selected_indices = select_candidate_indices(scenes.len(), ctx.config.max_frames_per_video);
    let last_pos = selected_indices.len().saturating_sub(1);
    let normalized = paths::normalized_path(&ctx.config.data_dir, video_id.as_str());

    let mut extracted = Vec::with_capacity(selected_indices.len());
    for &scene_idx in &selected_indices {
        let scene = scenes[scene_idx].clone();
        let midpoint = (scene.t_start + scene.t_end) / 2.0;
        let output_path = paths::frame_path(&ctx.config.data_dir, video_id.as_str(), scene.idx);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let retry = RetryConfig::new("extract_frame");
        retry_transient(&retry, || async {
            ctx.frame_extractor
                .extract_frame(&normalized, midpoint, &output_path)
                .await
                .map_err(WorkerError::from)
        })
        .await?;
        let phash = ctx.hasher.hash(&output_path).await?;

        extracted.push(Extracted {
            scene,
            t_frame: midpoint,
            path: output_path.to_string_lossy().to_string(),
            phash,
        });
    }

    let candidates: Vec<Candidate<Extracted>> = extracted
        .into_iter()
        .enumerate()
        .map(|(pos, e)| Candidate {
            is_endpoint: pos == 0 || pos == last_pos,
            phash: e.phash.clone(),
            payload: e,
        })
        .collect();

    let surviving = dedup_candidates(candidates);

    let rows: Vec<Frame> = surviving
        .into_iter()
        .enumerate()
        .map(|(idx, e)| {
            Frame::new(
                video_id.clone(),
                e.scene.id,
                idx as u32,
                e.t_frame,
                e.path,
                e.phash,
            )
        })
        .collect();

    ctx.storage.bulk_insert_frames(&rows).await?;
    Ok(())
}
