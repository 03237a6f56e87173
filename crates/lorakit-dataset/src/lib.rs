//! lorakit dataset
//!
//! Canonical training examples and the normalizer that produces them from:
//! - manually entered rows
//! - uploaded files of detected format (CSV/TSV, JSONL, conversation
//!   transcripts, markdown, plain text)
//! - free-text documents captioned by the backend

pub mod error;
pub mod example;
pub mod export;
pub mod formats;
pub mod normalizer;

pub use error::{DatasetError, DatasetResult};
pub use example::{CaptionMode, DatasetDraft, TrainingExample, UploadedFile};
pub use export::{to_jsonl, validate_examples, ExampleIssue, IssueKind};
pub use formats::{parse_file, FileFormat, ParsedFile, SUMMARY_INSTRUCTION};
pub use normalizer::{CaptionRequest, ExampleNormalizer, FileSummary, FileWarning, NormalizeOptions, NormalizedDataset};
