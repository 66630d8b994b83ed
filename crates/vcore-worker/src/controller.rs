//! §4.F: the job controller's top-level claim/run/resolve loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use vcore_storage::{ClaimedJob, JobSource};

use crate::logging::{JobLogger, Milestone};
use crate::pipeline::orchestrator::{run_pipeline, PipelineOutcome};
use crate::pipeline::PipelineContext;
use crate::retry::FailureTracker;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Consecutive claim failures logged at `warn` before the controller
/// suppresses further lines (a down database shouldn't spam the log at
/// `poll_interval_ms`).
const MAX_LOGGED_CLAIM_FAILURES: u32 = 3;

pub struct JobController {
    job_source: Arc<dyn JobSource>,
    pipeline_ctx: Arc<PipelineContext>,
    poll_interval: Duration,
    max_attempts: u32,
    shutdown_grace: Duration,
}

impl JobController {
    pub fn new(
        job_source: Arc<dyn JobSource>,
        pipeline_ctx: Arc<PipelineContext>,
        poll_interval: Duration,
        max_attempts: u32,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            job_source,
            pipeline_ctx,
            poll_interval,
            max_attempts,
            shutdown_grace,
        }
    }

    /// Runs the claim loop until `shutdown` fires. Stops claiming new jobs
    /// as soon as the signal arrives; a job already in flight is given
    /// `shutdown_grace` to finish before being reset to `pending`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.poll_interval;
        let mut claim_failures = FailureTracker::new(MAX_LOGGED_CLAIM_FAILURES);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                claimed = self.job_source.claim_next_job() => {
                    match claimed {
                        Ok(Some(job)) => {
                            backoff = self.poll_interval;
                            claim_failures.record_success();
                            crate::metrics::record_job_claimed();
                            self.run_claimed_job(job, shutdown.clone()).await;
                        }
                        Ok(None) => {
                            claim_failures.record_success();
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                        Err(e) => {
                            if claim_failures.record_failure() {
                                warn!("claim_next_job failed: {}", e);
                            }
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }

        info!("job controller stopped claiming new jobs");
    }

    async fn run_claimed_job(&self, job: ClaimedJob, mut shutdown: watch::Receiver<bool>) {
        let logger = JobLogger::new(job.job_id.as_str(), job.video_id.as_str());
        logger.milestone(Milestone::Claimed);

        let shutdown_grace = self.shutdown_grace;
        let grace_expired = async move {
            let _ = shutdown.changed().await;
            tokio::time::sleep(shutdown_grace).await;
        };

        tokio::select! {
            outcome = run_pipeline(&self.pipeline_ctx, &job.job_id, &job.video_id) => {
                self.resolve(&job, outcome).await;
            }
            _ = grace_expired => {
                warn!(job_id = %job.job_id, "shutdown grace period expired before job finished, resetting to pending");
                if let Err(e) = self
                    .job_source
                    .reset_job(&job.job_id, "worker shut down before job finished")
                    .await
                {
                    error!(job_id = %job.job_id, "failed to reset job on shutdown: {}", e);
                }
            }
        }
    }

    async fn resolve(&self, job: &ClaimedJob, outcome: PipelineOutcome) {
        match outcome {
            PipelineOutcome::Done => {
                crate::metrics::record_job_done();
                if let Err(e) = self.job_source.complete_job(&job.job_id).await {
                    error!(job_id = %job.job_id, "failed to mark job complete: {}", e);
                }
            }
            PipelineOutcome::Retryable(e) => {
                if job.attempts < self.max_attempts {
                    crate::metrics::record_job_retried();
                    if let Err(reset_err) =
                        self.job_source.reset_job(&job.job_id, &e.to_string()).await
                    {
                        error!(job_id = %job.job_id, "failed to reset job for retry: {}", reset_err);
                    }
                } else {
                    crate::metrics::record_job_failed();
                    if let Err(fail_err) =
                        self.job_source.fail_job(&job.job_id, &e.to_string()).await
                    {
                        error!(job_id = %job.job_id, "failed to fail exhausted job: {}", fail_err);
                    }
                }
            }
            PipelineOutcome::Fatal(e) => {
                crate::metrics::record_job_failed();
                if let Err(fail_err) = self.job_source.fail_job(&job.job_id, &e.to_string()).await
                {
                    error!(job_id = %job.job_id, "failed to fail job: {}", fail_err);
                }
            }
        }
    }
}
