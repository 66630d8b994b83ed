//! Shared data models for the video-processing worker.
//!
//! This crate provides plain, `sqlx`-free Serde structs and enums for:
//! - Video and Job, the two entities the external uploader produces.
//! - Scene, Frame, TranscriptSegment and FrameCaption, the four entities
//!   the core derives and persists.
//! - Deterministic identifier derivation (`ids`).
//!
//! Status enums carry no string-mapping logic of their own; the storage
//! gateway performs the string/variant mapping at the SQL boundary.

pub mod frame;
pub mod frame_caption;
pub mod ids;
pub mod job;
pub mod scene;
pub mod transcript_segment;
pub mod video;

pub use frame::Frame;
pub use frame_caption::{CaptionEntities, ControlEntity, FrameCaption, TextEntity};
pub use ids::{caption_id, derive_id, EntityKind};
pub use job::{Job, JobId, JobStatus};
pub use scene::Scene;
pub use transcript_segment::{TranscriptSegment, EMBEDDING_DIM};
pub use video::{Video, VideoId, VideoStatus};
