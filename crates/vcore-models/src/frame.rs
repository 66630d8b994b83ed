//! Frame entity: one still image sampled inside a scene.

use serde::{Deserialize, Serialize};

use crate::ids::{derive_id, EntityKind};
use crate::video::VideoId;

/// A still frame extracted at a scene's midpoint and surviving dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    pub video_id: VideoId,
    pub scene_id: String,
    /// Dense across surviving frames of the video, in order of acceptance.
    pub idx: u32,
    /// Satisfies `scene.t_start <= t_frame <= scene.t_end`.
    pub t_frame: f64,
    /// Filesystem path to the saved JPEG.
    pub path: String,
    /// 64-bit perceptual hash, encoded as a hex string.
    pub phash: String,
}

impl Frame {
    pub fn new(
        video_id: VideoId,
        scene_id: impl Into<String>,
        idx: u32,
        t_frame: f64,
        path: impl Into<String>,
        phash: impl Into<String>,
    ) -> Self {
        let id = derive_id(video_id.as_str(), EntityKind::Frame, idx);
        Self {
            id,
            video_id,
            scene_id: scene_id.into(),
            idx,
            t_frame,
            path: path.into(),
            phash: phash.into(),
        }
    }
}
