//! Structured job logging: one line per pipeline milestone (§6), plus
//! general-purpose progress/warning/error lines.

use tracing::{error, info, warn};

/// The nine milestones the orchestrator logs, in the order a
/// successful job passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Claimed,
    Normalized,
    Transcribed,
    Scenes,
    Frames,
    Vision,
    Embeddings,
    Ready,
    Failed,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Claimed => "CLAIMED",
            Milestone::Normalized => "NORMALIZED",
            Milestone::Transcribed => "TRANSCRIBED",
            Milestone::Scenes => "SCENES",
            Milestone::Frames => "FRAMES",
            Milestone::Vision => "VISION",
            Milestone::Embeddings => "EMBEDDINGS",
            Milestone::Ready => "READY",
            Milestone::Failed => "FAILED",
        }
    }
}

/// Per-job logger carrying job/video IDs as structured fields on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    video_id: String,
}

impl JobLogger {
    pub fn new(job_id: &str, video_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            video_id: video_id.to_string(),
        }
    }

    /// Log a milestone: exactly one line, ordered per job.
    pub fn milestone(&self, milestone: Milestone) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            milestone = milestone.as_str(),
            "{}", milestone.as_str()
        );
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, video_id = %self.video_id, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(job_id = %self.job_id, video_id = %self.video_id, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_strings_match_spec_names() {
        assert_eq!(Milestone::Claimed.as_str(), "CLAIMED");
        assert_eq!(Milestone::Embeddings.as_str(), "EMBEDDINGS");
        assert_eq!(Milestone::Failed.as_str(), "FAILED");
    }
}
