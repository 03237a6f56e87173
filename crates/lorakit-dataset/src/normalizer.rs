use crate::example::{CaptionMode, DatasetDraft, TrainingExample, UploadedFile};
use crate::formats::{parse_file, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Files larger than this are skipped with a warning.
    pub max_bytes_per_file: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { max_bytes_per_file: 50 * 1024 * 1024 }
    }
}

/// A file that contributed no rows, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWarning {
    pub file: String,
    pub message: String,
}

impl std::fmt::Display for FileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file, self.message)
    }
}

/// A file that was parsed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    pub format: FileFormat,
    /// Rows kept after dropping blank examples.
    pub rows: usize,
}

/// Payload for backend document captioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRequest {
    pub text: String,
    pub mode: CaptionMode,
}

/// Canonical output of the normalizer.
///
/// Rows are ordered manual, then file-derived, then document-derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDataset {
    pub examples: Vec<TrainingExample>,
    pub warnings: Vec<FileWarning>,
    pub files: Vec<FileSummary>,
    document_start: usize,
}

impl NormalizedDataset {
    /// Replaces the document-derived tail with `examples` (blank rows dropped).
    pub fn splice_document(&mut self, examples: impl IntoIterator<Item = TrainingExample>) {
        self.examples.truncate(self.document_start);
        self.examples.extend(examples.into_iter().filter(|ex| !ex.is_blank()));
    }

    /// Number of rows that came from the captioned document.
    pub fn document_rows(&self) -> usize {
        self.examples.len() - self.document_start
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Turns a `DatasetDraft` into canonical training examples.
///
/// Files are processed independently: a file that cannot be detected or
/// parsed is omitted and recorded as exactly one warning.
#[derive(Debug, Clone, Default)]
pub struct ExampleNormalizer {
    options: NormalizeOptions,
}

impl ExampleNormalizer {
    #[must_use]
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Normalizes manual rows and uploaded files. Document rows are added
    /// later with [`NormalizedDataset::splice_document`] once the backend
    /// has captioned the text.
    pub fn normalize(&self, draft: &DatasetDraft) -> NormalizedDataset {
        let mut dataset = NormalizedDataset::default();
        dataset
            .examples
            .extend(draft.rows.iter().filter(|ex| !ex.is_blank()).cloned());

        for file in &draft.files {
            let name = file.display_name();
            match self.normalize_file(file) {
                Ok((format, examples)) => {
                    debug!(file = %name, %format, rows = examples.len(), "normalized file");
                    dataset.files.push(FileSummary {
                        file: name,
                        format,
                        rows: examples.len(),
                    });
                    dataset.examples.extend(examples);
                }
                Err(message) => {
                    warn!(file = %name, %message, "skipping file");
                    dataset.warnings.push(FileWarning { file: name, message });
                }
            }
        }

        dataset.document_start = dataset.examples.len();
        dataset
    }

    /// Packages the draft's document for backend captioning, if there is one.
    pub fn caption_request(draft: &DatasetDraft) -> Option<CaptionRequest> {
        draft
            .document
            .as_ref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| CaptionRequest { text: text.clone(), mode: draft.caption_mode })
    }

    fn normalize_file(&self, file: &UploadedFile) -> Result<(FileFormat, Vec<TrainingExample>), String> {
        if file.bytes.len() > self.options.max_bytes_per_file {
            return Err(format!(
                "file is larger than {} bytes",
                self.options.max_bytes_per_file
            ));
        }

        let parsed = parse_file(file).map_err(|e| e.to_string())?;
        let examples = parsed.examples.into_iter().filter(|ex| !ex.is_blank()).collect();
        Ok((parsed.format, examples))
    }
}
