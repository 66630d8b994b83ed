//! Video-processing worker core: the job controller, the six-stage
//! pipeline orchestrator, and the ambient stack (config, logging, health
//! view) around them.
//!
//! `main.rs` wires the concrete collaborators (Postgres storage, ffmpeg
//! and OpenAI media primitives) and drives the claim loop; everything in
//! this crate is agnostic of those concrete types beyond the capability
//! traits exposed by `vcore-storage` and `vcore-media`.

pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod paths;
pub mod pipeline;
pub mod retry;
pub mod srt;

pub use config::WorkerConfig;
pub use controller::JobController;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{run_pipeline, PipelineContext, PipelineOrchestrator};
