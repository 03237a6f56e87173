use thiserror::Error;

pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("format not recognized: {0}")]
    Undetected(String),

    #[error("invalid {format} content: {message}")]
    Parse { format: &'static str, message: String },

    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl DatasetError {
    pub(crate) fn parse(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse { format, message: message.into() }
    }
}
