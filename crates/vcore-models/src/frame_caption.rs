//! FrameCaption entity: AI analysis of one frame's visual content.

use serde::{Deserialize, Serialize};

use crate::ids::caption_id;
use crate::video::VideoId;

/// A detected on-screen UI control, e.g. a button or slider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub position: String,
}

/// A detected span of text rendered on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntity {
    pub text: String,
    pub position: String,
}

/// Structured entities extracted from a frame alongside its caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaptionEntities {
    #[serde(default)]
    pub controls: Vec<ControlEntity>,
    #[serde(default)]
    pub text_on_screen: Vec<TextEntity>,
}

/// AI-generated caption and structured entities for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameCaption {
    pub id: String,
    pub frame_id: String,
    pub video_id: VideoId,
    pub caption: String,
    pub entities: CaptionEntities,
    pub embedding: Option<Vec<f32>>,
}

impl FrameCaption {
    pub fn new(
        video_id: VideoId,
        frame_id: impl Into<String>,
        caption: impl Into<String>,
        entities: CaptionEntities,
    ) -> Self {
        let frame_id = frame_id.into();
        let id = caption_id(&frame_id);
        Self {
            id,
            frame_id,
            video_id,
            caption: caption.into(),
            entities,
            embedding: None,
        }
    }
}
