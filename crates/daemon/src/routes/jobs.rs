//! Job-facing routes (SPEC §6): submit, read, abort, delete, and the SSE
//! event stream. Grounded on `examples/original_source/project_W/routers/jobs.py`'s
//! route shapes, re-expressed as axum handlers over the engine's
//! `JobLifecycleManager`.

use axum::extract::{Multipart, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use transcriptord_core::{JobId, SettingsId, TranscriptFormat};

use crate::auth::UserAuth;
use crate::context::AppContext;
use crate::error::HttpError;

fn require_jobs(ctx: &AppContext) -> Result<std::sync::Arc<transcriptord_engine::JobLifecycleManager>, HttpError> {
    ctx.jobs()
        .ok_or_else(|| transcriptord_engine::EngineError::inconsistent("app context not open").into())
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    job_id: i64,
}

/// `POST /jobs/submit_job`: multipart form with an `audio` file field and an
/// optional `settings_id` text field (SPEC §6).
pub async fn submit_job(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
    mut multipart: Multipart,
) -> Result<Json<SubmitJobResponse>, HttpError> {
    let jobs = require_jobs(&ctx)?;

    let mut file_name = "audio".to_string();
    let mut content_type = String::new();
    let mut settings_id: Option<SettingsId> = None;
    let mut audio_stream: Option<transcriptord_storage::AudioStream> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| transcriptord_engine::EngineError::validation(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "audio" => {
                file_name = field.file_name().unwrap_or("audio").to_string();
                content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                // Re-chunked from multipart's own framing rather than buffered
                // whole into memory (SPEC §4.1, §9 "Audio streaming").
                let chunks = field.map(|result| {
                    result
                        .map(|bytes| bytes.to_vec())
                        .map_err(|e| transcriptord_storage::StorageError::validation(e.to_string()))
                });
                audio_stream = Some(Box::pin(chunks));
            }
            "settings_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| transcriptord_engine::EngineError::validation(e.to_string()))?;
                let id: i64 = text
                    .parse()
                    .map_err(|_| transcriptord_engine::EngineError::validation("invalid settings_id"))?;
                settings_id = Some(SettingsId::new(id));
            }
            _ => {}
        }
    }

    let audio_stream =
        audio_stream.ok_or_else(|| transcriptord_engine::EngineError::validation("missing audio field"))?;

    let job_id = jobs
        .submit_job(caller.id, &file_name, &content_type, settings_id, audio_stream)
        .await?;

    Ok(Json(SubmitJobResponse { job_id: job_id.get() }))
}

#[derive(Serialize)]
pub struct CountResponse {
    count: i64,
}

/// `GET /jobs/count`.
pub async fn count(State(ctx): State<AppContext>, UserAuth(caller): UserAuth) -> Result<Json<CountResponse>, HttpError> {
    let jobs = require_jobs(&ctx)?;
    let count = jobs.count_jobs(caller.id).await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Deserialize)]
pub struct TopKQuery {
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// `GET /jobs/top_k`: the caller's jobs, most recent first.
pub async fn top_k(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
    Query(query): Query<TopKQuery>,
) -> Result<Json<Vec<transcriptord_core::Job>>, HttpError> {
    let jobs = require_jobs(&ctx)?;
    let list = jobs.list_jobs(caller.id, query.offset, query.limit).await?;
    Ok(Json(list))
}

#[derive(Deserialize)]
pub struct JobIdQuery {
    job_id: i64,
}

/// `GET /jobs/info`: a single job's metadata (SPEC §6).
pub async fn info(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
    Query(query): Query<JobIdQuery>,
) -> Result<Json<transcriptord_core::Job>, HttpError> {
    let jobs = require_jobs(&ctx)?;
    let job = jobs
        .get_job(caller.id, caller.is_admin, JobId::new(query.job_id))
        .await?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct AbortRequest {
    job_id: i64,
}

/// `POST /jobs/abort`.
pub async fn abort(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
    Json(body): Json<AbortRequest>,
) -> Result<(), HttpError> {
    let jobs = require_jobs(&ctx)?;
    jobs.abort_job(caller.id, caller.is_admin, JobId::new(body.job_id)).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    job_ids: Vec<i64>,
}

/// `DELETE /jobs/delete`.
pub async fn delete(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
    Json(body): Json<DeleteRequest>,
) -> Result<(), HttpError> {
    let jobs = require_jobs(&ctx)?;
    let ids: Vec<JobId> = body.job_ids.into_iter().map(JobId::new).collect();
    jobs.delete_jobs(caller.id, &ids).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct TranscriptQuery {
    job_id: i64,
    #[serde(default)]
    format: TranscriptFormatParam,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptFormatParam {
    #[default]
    Text,
    TimeCoded,
    TabSeparated,
    Captioned,
    Structured,
}

impl From<TranscriptFormatParam> for TranscriptFormat {
    fn from(value: TranscriptFormatParam) -> Self {
        match value {
            TranscriptFormatParam::Text => TranscriptFormat::Text,
            TranscriptFormatParam::TimeCoded => TranscriptFormat::TimeCoded,
            TranscriptFormatParam::TabSeparated => TranscriptFormat::TabSeparated,
            TranscriptFormatParam::Captioned => TranscriptFormat::Captioned,
            TranscriptFormatParam::Structured => TranscriptFormat::Structured,
        }
    }
}

/// `GET /jobs/transcript`: not in the spec's literal route table, but
/// `get_transcript` is a first-class `JobLifecycleManager` operation (SPEC
/// §4.5, §8) that needs an HTTP door.
pub async fn transcript(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
    Query(query): Query<TranscriptQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let jobs = require_jobs(&ctx)?;
    let rendered = jobs
        .get_transcript(caller.id, JobId::new(query.job_id), query.format.into())
        .await?;
    match rendered {
        transcriptord_core::Rendered::Text(text) => Ok(text.into_response()),
        transcriptord_core::Rendered::Structured(segments) => Ok(Json(segments).into_response()),
    }
}

/// `GET /jobs/events`: SSE subscription to the caller's event channel (SPEC
/// §4.6, §6). The subscription is dropped (and thus unsubscribed) when the
/// client disconnects.
pub async fn events(
    State(ctx): State<AppContext>,
    UserAuth(caller): UserAuth,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>>, HttpError> {
    let ephemeral = ctx
        .ephemeral()
        .ok_or_else(|| transcriptord_engine::EngineError::inconsistent("app context not open"))?;
    let stream = ephemeral.subscribe(caller.id).await.map_err(transcriptord_engine::EngineError::from)?;
    let events = stream.map(|event| {
        Ok(Event::default()
            .event(event.kind.to_string())
            .data(event.job_id.to_string()))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
