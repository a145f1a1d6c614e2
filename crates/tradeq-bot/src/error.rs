//! Application-level errors.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or parsing failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A submission was rejected at admission.
    #[error("admission rejected: {0}")]
    Admission(#[from] tradeq_core::AdmitError),
}

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;
