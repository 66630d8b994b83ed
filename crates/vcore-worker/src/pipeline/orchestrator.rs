//! §4.E: runs the six stages in sequence for one job, translating stage
//! failures into a job-level outcome the controller acts on.
//!
//! `PipelineOrchestrator` is assembled with a builder, grounded on
//! `Kaikei-e-Alt/recap-worker`'s `PipelineOrchestrator::builder()` pattern:
//! each stage is a `Stage` trait object, so a test can swap one out via
//! `replace_stage` without touching the rest of the sequence or the
//! `PipelineContext` the stages run against.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use vcore_models::{JobId, VideoId};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::{JobLogger, Milestone};
use crate::metrics;
use crate::pipeline::{embeddings, frames, normalize, scenes, transcribe, vision, PipelineContext};

/// What the job controller should do once the orchestrator returns.
pub enum PipelineOutcome {
    Done,
    /// Transient failure; the controller may re-enqueue within the
    /// attempt budget.
    Retryable(WorkerError),
    /// Permanent failure; the controller fails the job immediately.
    Fatal(WorkerError),
}

/// One step of the pipeline: runs against a shared `PipelineContext`,
/// names itself for per-stage metrics, and reports the milestone to log
/// on success.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn milestone(&self) -> Milestone;
    async fn run(&self, ctx: &PipelineContext, job_id: &JobId, video_id: &VideoId) -> WorkerResult<()>;
}

macro_rules! stage_impl {
    ($struct_name:ident, $module:ident, $name:literal, $milestone:expr) => {
        /// `Stage` wrapper around `pipeline::
        #[doc = stringify!($module)]
        /// ::run`.
        pub struct $struct_name;

        #[async_trait]
        impl Stage for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn milestone(&self) -> Milestone {
                $milestone
            }

            async fn run(
                &self,
                ctx: &PipelineContext,
                _job_id: &JobId,
                video_id: &VideoId,
            ) -> WorkerResult<()> {
                $module::run(ctx, video_id).await
            }
        }
    };
}

stage_impl!(NormalizeStage, normalize, "normalize", Milestone::Normalized);
stage_impl!(TranscribeStage, transcribe, "transcribe", Milestone::Transcribed);
stage_impl!(ScenesStage, scenes, "scenes", Milestone::Scenes);
stage_impl!(FramesStage, frames, "frames", Milestone::Frames);
stage_impl!(EmbeddingsStage, embeddings, "embeddings", Milestone::Embeddings);

/// Vision is the one stage that logs per-frame skip warnings through the
/// job's structured logger, so it needs the job id the other stages don't.
pub struct VisionStage;

#[async_trait]
impl Stage for VisionStage {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn milestone(&self) -> Milestone {
        Milestone::Vision
    }

    async fn run(&self, ctx: &PipelineContext, job_id: &JobId, video_id: &VideoId) -> WorkerResult<()> {
        vision::run(ctx, job_id, video_id).await
    }
}

/// Runs a sequence of stages for one job, stopping at the first failure.
pub struct PipelineOrchestrator {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineOrchestrator {
    /// Starts a builder pre-loaded with the production six-stage sequence;
    /// call `replace_stage` before `build()` to substitute one.
    pub fn builder() -> PipelineOrchestratorBuilder {
        PipelineOrchestratorBuilder {
            stages: vec![
                Arc::new(NormalizeStage),
                Arc::new(TranscribeStage),
                Arc::new(ScenesStage),
                Arc::new(FramesStage),
                Arc::new(VisionStage),
                Arc::new(EmbeddingsStage),
            ],
        }
    }

    pub async fn run(&self, ctx: &PipelineContext, job_id: &JobId, video_id: &VideoId) -> PipelineOutcome {
        let logger = JobLogger::new(job_id.as_str(), video_id.as_str());

        for stage in &self.stages {
            let started = Instant::now();
            if let Err(e) = stage.run(ctx, job_id, video_id).await {
                logger.error(&e.to_string());
                logger.milestone(Milestone::Failed);
                return if e.is_retryable() {
                    PipelineOutcome::Retryable(e)
                } else {
                    PipelineOutcome::Fatal(e)
                };
            }
            metrics::record_stage_duration(stage.name(), started.elapsed().as_secs_f64());
            logger.milestone(stage.milestone());
        }

        logger.milestone(Milestone::Ready);
        PipelineOutcome::Done
    }
}

pub struct PipelineOrchestratorBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineOrchestratorBuilder {
    /// Substitutes the stage matching `name` (see `Stage::name`) with a
    /// different implementation, leaving the rest of the sequence as-is.
    /// A name that matches nothing is a no-op.
    pub fn replace_stage(mut self, name: &str, stage: Arc<dyn Stage>) -> Self {
        if let Some(slot) = self.stages.iter_mut().find(|s| s.name() == name) {
            *slot = stage;
        }
        self
    }

    pub fn build(self) -> PipelineOrchestrator {
        PipelineOrchestrator { stages: self.stages }
    }
}

/// Runs the default production sequence — what the job controller calls
/// for every claimed job.
pub async fn run_pipeline(ctx: &PipelineContext, job_id: &JobId, video_id: &VideoId) -> PipelineOutcome {
    PipelineOrchestrator::builder().build().run(ctx, job_id, video_id).await
}
