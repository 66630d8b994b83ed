//! Scene entity: a half-open time interval of the normalized video.

use serde::{Deserialize, Serialize};

use crate::ids::{derive_id, EntityKind};
use crate::video::VideoId;

/// A detected scene boundary, dense-indexed per video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub video_id: VideoId,
    /// 0-based, dense per video.
    pub idx: u32,
    pub t_start: f64,
    pub t_end: f64,
}

impl Scene {
    pub fn new(video_id: VideoId, idx: u32, t_start: f64, t_end: f64) -> Self {
        let id = derive_id(video_id.as_str(), EntityKind::Scene, idx);
        Self {
            id,
            video_id,
            idx,
            t_start,
            t_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_derived_from_video_id_and_idx() {
        let scene = Scene::new(VideoId::from_string("vid-1"), 3, 10.0, 22.5);
        assert_eq!(scene.id, "vid-1_scene_003");
    }
}
