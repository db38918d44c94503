//! Ephemeral-store error taxonomy (SPEC §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal inconsistency: {0}")]
    Inconsistent(String),
}

impl CacheError {
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
