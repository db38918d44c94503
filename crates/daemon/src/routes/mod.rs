//! Route wiring (SPEC §6 "External interfaces").

pub mod jobs;
pub mod runners;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/jobs/submit_job", post(jobs::submit_job))
        .route("/jobs/count", get(jobs::count))
        .route("/jobs/top_k", get(jobs::top_k))
        .route("/jobs/info", get(jobs::info))
        .route("/jobs/abort", post(jobs::abort))
        .route("/jobs/delete", delete(jobs::delete))
        .route("/jobs/transcript", get(jobs::transcript))
        .route("/jobs/events", get(jobs::events))
        .route("/runners/register", post(runners::register))
        .route("/runners/unregister", post(runners::unregister))
        .route("/runners/retrieve_job_info", get(runners::retrieve_job_info))
        .route("/runners/retrieve_job_audio", post(runners::retrieve_job_audio))
        .route("/runners/submit_job_result", post(runners::submit_job_result))
        .route("/runners/heartbeat", post(runners::heartbeat))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
