//! Authentication extractors for the HTTP surface.
//!
//! User authentication resolves a bearer credential to a [`LoginContext`]
//! through the [`AuthProvider`] trait boundary wired into the app context
//! (SPEC §9 "Polymorphic user variants" — concrete verification is out of
//! scope). Runner authentication is just header parsing: the actual
//! credential check happens inside [`transcriptord_engine::RunnerSessionManager`],
//! which is the layer that owns that decision.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use transcriptord_core::{LoginContext, RunnerId};
use transcriptord_engine::EngineError;

use crate::context::AppContext;
use crate::error::HttpError;

/// The caller's resolved identity, extracted from `Authorization: Bearer <credential>`.
pub struct UserAuth(pub LoginContext);

#[async_trait]
impl FromRequestParts<AppContext> for UserAuth {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let auth = state
            .auth()
            .ok_or_else(|| HttpError::from(EngineError::inconsistent("app context not open")))?;
        let login = auth.authenticate(&token).ok_or(EngineError::Unauthorized)?;
        Ok(UserAuth(login))
    }
}

fn bearer_token(parts: &Parts) -> Result<String, HttpError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(EngineError::Unauthorized)?;
    header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| HttpError::from(EngineError::Unauthorized))
}

/// A runner's claimed session identity, carried as `X-Runner-Id` /
/// `X-Session-Token` headers. Not yet verified — every
/// [`transcriptord_engine::RunnerSessionManager`] method re-checks the
/// session token hash itself.
pub struct RunnerAuth {
    pub runner_id: RunnerId,
    pub session_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for RunnerAuth
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let runner_id = header_value(parts, "x-runner-id")?
            .parse::<i64>()
            .map_err(|_| HttpError::from(EngineError::validation("invalid x-runner-id header")))?;
        let session_token = header_value(parts, "x-session-token")?;
        Ok(Self {
            runner_id: RunnerId::new(runner_id),
            session_token,
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> Result<String, HttpError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| HttpError::from(EngineError::Unauthorized))
}
