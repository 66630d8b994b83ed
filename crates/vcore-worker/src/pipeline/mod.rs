//! The six-stage pipeline orchestrator (§4.D, §4.E).

pub mod embeddings;
pub mod frames;
pub mod normalize;
pub mod orchestrator;
pub mod scenes;
pub mod transcribe;
pub mod vision;

use std::sync::Arc;

use vcore_media::{Embedder, FrameExtractor, PerceptualHasher, SceneDetector, Transcoder, Transcriber, VisionCaptioner};
use vcore_storage::Storage;

use crate::config::WorkerConfig;

pub use orchestrator::{run_pipeline, PipelineOrchestrator, PipelineOutcome, Stage};

/// Everything a stage needs: the storage gateway, the media capabilities,
/// and the relevant slice of configuration. Constructed once at process
/// start and shared across jobs (§9's "injected collaborators" note).
pub struct PipelineContext {
    pub storage: Arc<dyn Storage>,
    pub transcoder: Arc<dyn Transcoder>,
    pub scene_detector: Arc<dyn SceneDetector>,
    pub frame_extractor: Arc<dyn FrameExtractor>,
    pub hasher: Arc<dyn PerceptualHasher>,
    pub transcriber: Arc<dyn Transcriber>,
    pub vision_captioner: Arc<dyn VisionCaptioner>,
    pub embedder: Arc<dyn Embedder>,
    pub config: WorkerConfig,
}
