//! The HTTP-boundary error type (SPEC §7): translates the engine's
//! structured errors into responses, logging internal-inconsistency and
//! transient failures the way a caller can't be expected to act on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use transcriptord_core::CoreError;
use transcriptord_engine::EngineError;
use transcriptord_storage::StorageError;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct HttpError(#[from] EngineError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            EngineError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            EngineError::SessionMismatch => (StatusCode::UNAUTHORIZED, "session token mismatch".to_string()),
            EngineError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            EngineError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            EngineError::Aborting => (StatusCode::METHOD_NOT_ALLOWED, "job is aborting".to_string()),
            // Conflicts split by call site, per SPEC §6/§7: already-finished
            // and similar preconditions are 400, already-online is 403.
            EngineError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::AlreadyOnline(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            EngineError::Inconsistent(msg) => {
                tracing::error!(detail = %msg, "internal inconsistency at the HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, "try again shortly".to_string())
            }
            EngineError::Core(CoreError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::Core(CoreError::Inconsistent(msg)) => {
                tracing::error!(detail = %msg, "internal inconsistency at the HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, "try again shortly".to_string())
            }
            EngineError::Cache(err) => {
                tracing::error!(error = %err, "ephemeral store error at the HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, "try again shortly".to_string())
            }
            EngineError::Storage(err) => {
                tracing::error!(error = %err, "durable store error at the HTTP boundary");
                let message = match err {
                    StorageError::Database(_) => "try again shortly".to_string(),
                    other => other.to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}
