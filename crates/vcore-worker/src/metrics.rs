//! Prometheus metrics for the job controller and pipeline.
//!
//! Deliberately thin: these counters back the same queue-depth and
//! outcome numbers the health view already exposes as JSON, so the
//! `/metrics` surface (when enabled) is a second rendering of that data,
//! not a second observability model.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide Prometheus recorder. Call once at startup;
/// panics if a recorder is already installed.
pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

pub mod names {
    pub const JOBS_CLAIMED_TOTAL: &str = "vcore_jobs_claimed_total";
    pub const JOBS_DONE_TOTAL: &str = "vcore_jobs_done_total";
    pub const JOBS_RETRIED_TOTAL: &str = "vcore_jobs_retried_total";
    pub const JOBS_FAILED_TOTAL: &str = "vcore_jobs_failed_total";
    pub const STAGE_DURATION_SECONDS: &str = "vcore_stage_duration_seconds";
    pub const VISION_FRAMES_SKIPPED_TOTAL: &str = "vcore_vision_frames_skipped_total";
}

pub fn record_job_claimed() {
    counter!(names::JOBS_CLAIMED_TOTAL).increment(1);
}

pub fn record_job_done() {
    counter!(names::JOBS_DONE_TOTAL).increment(1);
}

pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

pub fn record_job_failed() {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

pub fn record_vision_frame_skipped() {
    counter!(names::VISION_FRAMES_SKIPPED_TOTAL).increment(1);
}
