//! Runner-facing routes (SPEC §6): register, unregister, pull work, submit
//! results, heartbeat. Grounded on
//! `examples/original_source/project_W/routers/runners.py`'s route shapes.

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use transcriptord_core::{Segment, Transcript};
use transcriptord_engine::{EngineError, JobOutcome, RunnerDeclaration};

use crate::auth::RunnerAuth;
use crate::context::AppContext;
use crate::error::HttpError;

fn require_sessions(
    ctx: &AppContext,
) -> Result<std::sync::Arc<transcriptord_engine::RunnerSessionManager>, HttpError> {
    ctx.sessions()
        .ok_or_else(|| EngineError::inconsistent("app context not open").into())
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    token: String,
    name: String,
    version: String,
    git_hash: String,
    source_url: String,
    #[serde(default)]
    priority: i64,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    id: i64,
    session_token: String,
}

/// `POST /runners/register`.
pub async fn register(
    State(ctx): State<AppContext>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, HttpError> {
    let sessions = require_sessions(&ctx)?;
    let session = sessions
        .register(
            &body.token,
            RunnerDeclaration {
                name: body.name,
                version: body.version,
                git_hash: body.git_hash,
                source_url: body.source_url,
                priority: body.priority,
            },
        )
        .await?;
    Ok(Json(RegisterResponse {
        id: session.runner_id.get(),
        session_token: session.session_token,
    }))
}

/// `POST /runners/unregister`.
pub async fn unregister(State(ctx): State<AppContext>, auth: RunnerAuth) -> Result<(), HttpError> {
    let sessions = require_sessions(&ctx)?;
    sessions.unregister(auth.runner_id, &auth.session_token).await?;
    Ok(())
}

#[derive(Serialize)]
pub struct JobInfoResponse {
    job_id: i64,
    settings: transcriptord_core::JobSettings,
}

/// `GET /runners/retrieve_job_info`.
pub async fn retrieve_job_info(
    State(ctx): State<AppContext>,
    auth: RunnerAuth,
) -> Result<Json<JobInfoResponse>, HttpError> {
    let sessions = require_sessions(&ctx)?;
    let (job_id, settings) = sessions
        .retrieve_job_info(auth.runner_id, &auth.session_token)
        .await?;
    Ok(Json(JobInfoResponse {
        job_id: job_id.get(),
        settings,
    }))
}

/// `POST /runners/retrieve_job_audio`: streams the audio blob and flips the
/// runner to IN_PROGRESS (SPEC §4.4).
pub async fn retrieve_job_audio(State(ctx): State<AppContext>, auth: RunnerAuth) -> Result<Response, HttpError> {
    let sessions = require_sessions(&ctx)?;
    let stream = sessions
        .retrieve_job_audio(auth.runner_id, &auth.session_token)
        .await?;
    let body = Body::from_stream(stream);
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitResultRequest {
    Success { segments: Vec<Segment> },
    Failure { error_msg: String },
}

/// `POST /runners/submit_job_result`.
pub async fn submit_job_result(
    State(ctx): State<AppContext>,
    auth: RunnerAuth,
    Json(body): Json<SubmitResultRequest>,
) -> Result<(), HttpError> {
    let sessions = require_sessions(&ctx)?;
    let job_id = sessions.assigned_job_id(auth.runner_id, &auth.session_token).await?;
    let outcome = match body {
        SubmitResultRequest::Success { segments } => JobOutcome::Success {
            transcript: Transcript::new(job_id, segments),
        },
        SubmitResultRequest::Failure { error_msg } => JobOutcome::Failure { error_msg },
    };
    sessions.submit_result(auth.runner_id, &auth.session_token, outcome).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    progress: f64,
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    abort: bool,
    job_assigned: bool,
}

/// `POST /runners/heartbeat`.
pub async fn heartbeat(
    State(ctx): State<AppContext>,
    auth: RunnerAuth,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, HttpError> {
    let sessions = require_sessions(&ctx)?;
    let outcome = sessions
        .heartbeat(auth.runner_id, &auth.session_token, body.progress)
        .await?;
    Ok(Json(HeartbeatResponse {
        abort: outcome.abort,
        job_assigned: outcome.job_assigned,
    }))
}
