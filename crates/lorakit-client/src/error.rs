//! Error taxonomy shared by every backend operation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result of one backend exchange. The client never fails past this type.
pub type JobResult<T> = std::result::Result<T, JobFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The backend could not be reached or the transport broke mid-exchange.
    Network,
    /// No response arrived within the allotted time.
    Timeout,
    /// The response body was not the expected shape.
    BadResponse,
    /// The backend answered with a non-success status.
    ServerRejected,
    /// Client-side input check failed before a request was built.
    Validation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Network => "network error",
            Self::Timeout => "timed out",
            Self::BadResponse => "bad response",
            Self::ServerRejected => "rejected by backend",
            Self::Validation => "invalid input",
        };
        f.write_str(label)
    }
}

/// A failed job: the error kind plus the raw message shown to the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("no response after {}s", after.as_secs()))
    }

    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadResponse, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerRejected, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// An operator-facing suggestion for well-known backend failures.
    pub fn hint(&self) -> Option<&'static str> {
        let message = self.message.to_lowercase();
        if message.contains("cuda out of memory") || message.contains("cublas") {
            Some("GPU memory exhausted. Lower the batch size or switch to QLoRA (4-bit).")
        } else if message.contains("bitsandbytes") {
            Some("bitsandbytes is unavailable. Install it, or switch to LoRA on CPU/FP16.")
        } else if message.contains("no such file") {
            Some("Check the path; the file does not exist on the backend.")
        } else {
            None
        }
    }
}
