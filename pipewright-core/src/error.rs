//! Pipewright error abstractions.

use thiserror::Error;

/// Application error variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// A target host could not be reached.
    ///
    /// Surfaced immediately for registration probes, never retried there; the
    /// watch engine handles its own store connectivity retries instead.
    #[error("connection error: {0}")]
    Connection(String),
    /// The given input was invalid.
    #[error("validation error: {0}")]
    InvalidInput(String),
    /// The given JSON Schema document could not be compiled.
    #[error("invalid JSON Schema: {0}")]
    InvalidSchema(String),
    /// The requested resource is not found.
    #[error("the requested resource was not found")]
    NotFound,
    /// The server has hit an internal error, but will remain online.
    #[error("internal error")]
    Ise(anyhow::Error),
}
