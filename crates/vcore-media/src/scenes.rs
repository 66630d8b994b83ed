//! Scene-detection capability.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

/// Minimum scene length this detector targets — not a hard invariant, per
/// the detector's own contract (real content may produce shorter scenes).
const TARGET_MIN_SCENE_SECS: f64 = 15.0;

/// Detects scene-cut boundaries in a video, returning an ordered list of
/// adjacent half-open `(t_start, t_end)` intervals covering the whole
/// video. Guarantees `count >= 1`, first `t_start == 0`, last `t_end`
/// approximately the video duration.
#[async_trait]
pub trait SceneDetector: Send + Sync {
    async fn detect_scenes(&self, video_path: &Path) -> MediaResult<Vec<(f64, f64)>>;
}

/// Detects scene cuts via ffmpeg's `select='gt(scene,THRESHOLD)'` filter,
/// then merges any run shorter than [`TARGET_MIN_SCENE_SECS`] into its
/// neighbor so the target length is respected whenever possible.
pub struct FfmpegSceneDetector {
    threshold: f64,
}

impl Default for FfmpegSceneDetector {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl FfmpegSceneDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    async fn detect_cut_points(&self, video_path: &Path) -> MediaResult<Vec<f64>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let filter = format!("select='gt(scene,{})',showinfo", self.threshold);
        let mut child = Command::new("ffmpeg")
            .args(["-i"])
            .arg(video_path)
            .args(["-vf", &filter, "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut lines = BufReader::new(stderr).lines();
        let mut cut_points = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if let Some(pts_time) = parse_showinfo_pts_time(&line) {
                cut_points.push(pts_time);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "scene detection filter failed",
                status.code(),
            ));
        }

        Ok(cut_points)
    }
}

#[async_trait]
impl SceneDetector for FfmpegSceneDetector {
    async fn detect_scenes(&self, video_path: &Path) -> MediaResult<Vec<(f64, f64)>> {
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.display().to_string()));
        }

        let duration = get_duration(video_path).await?;
        let mut cut_points = self.detect_cut_points(video_path).await?;
        cut_points.retain(|&t| t > 0.0 && t < duration);
        cut_points.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut boundaries = vec![0.0];
        boundaries.extend(cut_points);
        boundaries.push(duration);
        boundaries.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

        let merged = merge_short_scenes(boundaries, TARGET_MIN_SCENE_SECS);

        let scenes: Vec<(f64, f64)> = merged.windows(2).map(|w| (w[0], w[1])).collect();
        if scenes.is_empty() {
            return Ok(vec![(0.0, duration.max(0.0))]);
        }
        Ok(scenes)
    }
}

fn merge_short_scenes(boundaries: Vec<f64>, target_min: f64) -> Vec<f64> {
    if boundaries.len() < 2 {
        return boundaries;
    }
    let mut merged = vec![boundaries[0]];
    for &b in &boundaries[1..boundaries.len() - 1] {
        let last = *merged.last().unwrap();
        if b - last < target_min {
            debug!(start = last, candidate_end = b, "merging short scene candidate");
            continue;
        }
        merged.push(b);
    }
    merged.push(*boundaries.last().unwrap());
    if merged.len() < 2 {
        warn!("scene merge collapsed to a single boundary, falling back to full span");
        return vec![boundaries[0], *boundaries.last().unwrap()];
    }
    merged
}

fn parse_showinfo_pts_time(line: &str) -> Option<f64> {
    let marker = "pts_time:";
    let idx = line.find(marker)?;
    let rest = &line[idx + marker.len()..];
    let value: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    value.parse().ok()
}
