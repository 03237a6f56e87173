//! Error types for the workflow core.

use lorakit_client::{JobFailure, JobKind};
use thiserror::Error;

/// A form field failed its pre-submission check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl From<ValidationError> for JobFailure {
    fn from(e: ValidationError) -> Self {
        JobFailure::validation(e.to_string())
    }
}

/// Why a submission was not accepted. A rejected submission changes nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The slot already has a request in flight.
    #[error("a {0} request is already in progress")]
    Busy(JobKind),

    /// Client-side validation failed; no request was built.
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationError),

    /// There is nothing to send (e.g. captioning without a document).
    #[error("nothing to submit: {0}")]
    NothingToSubmit(&'static str),

    /// Jobs can only be spawned from inside a tokio runtime.
    #[error("no async runtime available to run the request")]
    NoRuntime,
}

/// Errors that can occur while loading console configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
