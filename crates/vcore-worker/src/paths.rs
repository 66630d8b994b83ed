//! Filesystem layout under the configured data root (§6).

use std::path::{Path, PathBuf};

pub fn normalized_path(data_dir: &str, video_id: &str) -> PathBuf {
    Path::new(data_dir)
        .join("processed")
        .join(video_id)
        .join("normalized.mp4")
}

pub fn audio_path(data_dir: &str, video_id: &str) -> PathBuf {
    Path::new(data_dir)
        .join("processed")
        .join(video_id)
        .join("audio.wav")
}

pub fn frames_dir(data_dir: &str, video_id: &str) -> PathBuf {
    Path::new(data_dir).join("frames").join(video_id)
}

pub fn frame_path(data_dir: &str, video_id: &str, idx: u32) -> PathBuf {
    frames_dir(data_dir, video_id).join(format!("scene_{idx:03}.jpg"))
}

pub fn subs_path(data_dir: &str, video_id: &str) -> PathBuf {
    Path::new(data_dir).join("subs").join(format!("{video_id}.srt"))
}

pub fn original_path(data_dir: &str, relative: &str) -> PathBuf {
    Path::new(data_dir).join(relative)
}
