//! §4.G / §6: the read-only HTTP health view over the storage gateway.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use vcore_storage::JobSource;

#[derive(Clone)]
pub struct HealthState {
    pub job_source: Arc<dyn JobSource>,
}

/// `metrics_handle` is `None` unless the process-wide Prometheus recorder
/// was installed; the `/metrics` route is only merged in when it's present.
pub fn router(state: HealthState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs/peek", get(jobs_peek))
        .route("/stats", get(stats))
        .with_state(state);

    match metrics_handle {
        Some(handle) => {
            router.route("/metrics", get(move || async move { handle.render() }))
        }
        None => router,
    }
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
    status: &'static str,
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    match state.job_source.stats().await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthzResponse {
                ok: true,
                status: "healthy",
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthzResponse {
                ok: false,
                status: "unhealthy",
            }),
        ),
    }
}

#[derive(Serialize)]
struct PeekJob {
    job_id: String,
    video_id: String,
    status: String,
    attempts: u32,
}

#[derive(Serialize)]
struct PeekResponse {
    pending_jobs: usize,
    jobs: Vec<PeekJob>,
}

async fn jobs_peek(State(state): State<HealthState>) -> impl IntoResponse {
    match state.job_source.peek_queue(50).await {
        Ok(rows) => {
            let jobs: Vec<PeekJob> = rows
                .into_iter()
                .map(|r| PeekJob {
                    job_id: r.job_id.to_string(),
                    video_id: r.video_id.to_string(),
                    status: r.status.as_str().to_string(),
                    attempts: r.attempts,
                })
                .collect();
            (
                StatusCode::OK,
                Json(PeekResponse {
                    pending_jobs: jobs.len(),
                    jobs,
                }),
            )
                .into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct StatsResponse {
    pending: i64,
    processing: i64,
    done: i64,
    failed: i64,
}

async fn stats(State(state): State<HealthState>) -> impl IntoResponse {
    match state.job_source.stats().await {
        Ok(s) => (
            StatusCode::OK,
            Json(StatsResponse {
                pending: s.pending,
                processing: s.processing,
                done: s.done,
                failed: s.failed,
            }),
        )
            .into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
