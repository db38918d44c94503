//! Engine error taxonomy (SPEC §7), chaining the store layers' errors in.

use thiserror::Error;
use transcriptord_cache::CacheError;
use transcriptord_core::CoreError;
use transcriptord_storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    /// The runner credential resolved to an online runner, but the
    /// presented session token doesn't match its hash — distinct from
    /// generic 401 because it implies the credential was reused elsewhere
    /// (SPEC §4.4).
    #[error("session token mismatch")]
    SessionMismatch,

    /// The job is aborting; runner-facing reads on it must refuse (SPEC
    /// §4.4 `retrieve_job_info`/`retrieve_job_audio`, 405-shaped).
    #[error("job is aborting")]
    Aborting,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The runner is already registered online (SPEC §4.4 `register`
    /// precondition, SPEC §6 `POST /runners/register` 403). Distinct from
    /// [`EngineError::Conflict`] because it carries a different HTTP status
    /// (403, not 400) at the boundary.
    #[error("already online: {0}")]
    AlreadyOnline(String),

    #[error("internal inconsistency: {0}")]
    Inconsistent(String),

    #[error("durable store error: {0}")]
    Storage(StorageError),

    #[error("ephemeral store error: {0}")]
    Cache(#[from] CacheError),

    #[error("domain error: {0}")]
    Core(#[from] CoreError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn already_online(msg: impl Into<String>) -> Self {
        Self::AlreadyOnline(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }
}

impl From<StorageError> for EngineError {
    // Narrow a handful of storage-layer variants to their engine-level
    // counterparts so handlers don't need to match on the inner error twice.
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => EngineError::NotFound,
            StorageError::Conflict(msg) => EngineError::Conflict(msg),
            StorageError::Validation(msg) => EngineError::Validation(msg),
            StorageError::Inconsistent(msg) => EngineError::Inconsistent(msg),
            other => EngineError::Storage(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
