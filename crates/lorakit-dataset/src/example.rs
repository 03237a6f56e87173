use crate::error::{DatasetError, DatasetResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A canonical instruction-tuning example.
///
/// Every input source (manual rows, uploaded files, captioned documents) is
/// normalized into this shape before it is sent to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl TrainingExample {
    #[must_use]
    pub fn new(instruction: impl Into<String>, output: impl Into<String>) -> Self {
        Self { instruction: instruction.into(), output: output.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// True when both `instruction` and `output` are empty. Blank examples are
    /// never submitted.
    pub fn is_blank(&self) -> bool {
        self.instruction.trim().is_empty() && self.output.trim().is_empty()
    }
}

/// A raw file handed to the console. The name is only a hint; the format is
/// detected from the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Where the file was read from. `None` for in-memory uploads.
    pub path: Option<PathBuf>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into(), path: None }
    }

    pub fn from_path(path: &Path) -> DatasetResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|source| DatasetError::Io { path: path.display().to_string(), source })?;
        let name = path
            .file_name()
            .map_or_else(|| path.to_string_lossy().to_string(), |n| n.to_string_lossy().to_string());
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(Self { name, bytes, path: Some(path) })
    }

    /// Full path when known, otherwise the bare name. Distinguishes uploads
    /// that share a file name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path.as_ref().map_or_else(|| self.name.clone(), |p| p.display().to_string())
    }

    /// True when both uploads come from the same source: the same path, or,
    /// for in-memory uploads, the same name.
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        match (&self.path, &other.path) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name,
            _ => false,
        }
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }
}

/// How a free-text document is turned into examples by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionMode {
    /// Summary prompts plus generated question/answer pairs.
    #[default]
    SummaryQa,
}

impl CaptionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SummaryQa => "summary_qa",
        }
    }
}

/// Everything the operator entered on the data stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetDraft {
    /// Manually entered rows, in entry order.
    pub rows: Vec<TrainingExample>,
    /// Uploaded files, in upload order.
    pub files: Vec<UploadedFile>,
    /// Raw document to caption, if any.
    pub document: Option<String>,
    pub caption_mode: CaptionMode,
}

impl DatasetDraft {
    /// Appends an empty manual row and returns its index.
    pub fn add_row(&mut self) -> usize {
        self.rows.push(TrainingExample::default());
        self.rows.len() - 1
    }

    /// Replaces the manual row at `index`. Returns false when out of range.
    pub fn set_row(&mut self, index: usize, example: TrainingExample) -> bool {
        match self.rows.get_mut(index) {
            Some(row) => {
                *row = example;
                true
            }
            None => false,
        }
    }

    pub fn remove_row(&mut self, index: usize) -> Option<TrainingExample> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    /// Adds a file. Re-uploading the same source replaces the earlier upload
    /// in place; files that merely share a name are kept side by side.
    pub fn add_file(&mut self, file: UploadedFile) {
        if let Some(existing) = self.files.iter_mut().find(|f| f.same_source(&file)) {
            *existing = file;
        } else {
            self.files.push(file);
        }
    }

    pub fn remove_file(&mut self, index: usize) -> Option<UploadedFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn set_document(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.document = (!text.trim().is_empty()).then_some(text);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(TrainingExample::is_blank) && self.files.is_empty() && self.document.is_none()
    }
}
