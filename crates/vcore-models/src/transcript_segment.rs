//! TranscriptSegment entity: one contiguous utterance from the audio track.

use serde::{Deserialize, Serialize};

use crate::ids::{derive_id, EntityKind};
use crate::video::VideoId;

/// An embedding dimension fixed by the OpenAI embedding model this worker
/// targets (`text-embedding-3-small`).
pub const EMBEDDING_DIM: usize = 1536;

/// One transcribed utterance, with an optional semantic embedding filled in
/// by the Embeddings stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub video_id: VideoId,
    pub idx: u32,
    pub t_start: f64,
    pub t_end: f64,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

impl TranscriptSegment {
    pub fn new(video_id: VideoId, idx: u32, t_start: f64, t_end: f64, text: impl Into<String>) -> Self {
        let id = derive_id(video_id.as_str(), EntityKind::Segment, idx);
        Self {
            id,
            video_id,
            idx,
            t_start,
            t_end,
            text: text.into(),
            embedding: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_derived_from_video_id_and_idx() {
        let segment = TranscriptSegment::new(VideoId::from_string("vid-1"), 0, 0.0, 6.0, "hello");
        assert_eq!(segment.id, "vid-1_segment_000");
        assert!(segment.embedding.is_none());
    }
}
