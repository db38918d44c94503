//! Errors raised by pure domain logic (no I/O).
//!
//! Store, engine, and HTTP-boundary errors each have their own `thiserror`
//! enum in their respective crates, with `#[from] CoreError` arms chaining
//! into them — this type is the innermost layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal inconsistency: {0}")]
    Inconsistent(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
