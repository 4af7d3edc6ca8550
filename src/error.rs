//! Typed errors produced by the core engine.
//!
//! The CLI (or any outer transport) maps these onto user-facing responses;
//! the core only guarantees an inspectable value. Validation and ownership
//! failures are raised before any write, so an error never leaves partial
//! state behind.

/// Errors returned by the task store, scoring engine, and sweeper.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: task does not belong to the calling user")]
    Forbidden,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
