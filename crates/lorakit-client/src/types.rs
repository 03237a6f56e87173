//! Request and response payloads for each backend operation.

use lorakit_dataset::{to_jsonl, CaptionRequest, DatasetResult, TrainingExample, UploadedFile};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend operation kinds. Each kind owns one job slot in the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    EnvProbe,
    Ingest,
    Caption,
    Train,
    Evaluate,
    ExportCard,
}

impl JobKind {
    pub const ALL: [JobKind; 6] = [
        Self::EnvProbe,
        Self::Ingest,
        Self::Caption,
        Self::Train,
        Self::Evaluate,
        Self::ExportCard,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::EnvProbe => "environment probe",
            Self::Ingest => "ingest",
            Self::Caption => "caption",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::ExportCard => "export card",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub name: String,
    #[serde(default)]
    pub vram_gb: f64,
}

/// Environment descriptor reported by the backend.
///
/// Only the commonly reported fields are typed; anything else the backend
/// sends is kept in `extra` for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvInfo {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub cuda_available: bool,
    #[serde(default)]
    pub torch_version: Option<String>,
    #[serde(default)]
    pub gpus: Vec<GpuInfo>,
    #[serde(default)]
    pub bitsandbytes_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnvInfo {
    /// Largest VRAM of any single GPU, in GB.
    pub fn max_vram_gb(&self) -> Option<f64> {
        self.gpus.iter().map(|g| g.vram_gb).reduce(f64::max)
    }

    /// 4-bit QLoRA needs CUDA and bitsandbytes; otherwise plain LoRA.
    pub fn recommended_lora_type(&self) -> LoraType {
        if self.cuda_available && self.bitsandbytes_available {
            LoraType::QLora
        } else {
            LoraType::Lora
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoraType {
    #[serde(rename = "lora")]
    Lora,
    #[default]
    #[serde(rename = "qlora")]
    QLora,
}

impl LoraType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lora => "lora",
            Self::QLora => "qlora",
        }
    }
}

impl std::fmt::Display for LoraType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lora => f.write_str("LoRA"),
            Self::QLora => f.write_str("QLoRA"),
        }
    }
}

impl std::str::FromStr for LoraType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lora" => Ok(Self::Lora),
            "qlora" => Ok(Self::QLora),
            other => Err(format!("unknown adapter type '{other}' (expected lora or qlora)")),
        }
    }
}

/// Files uploaded to the backend for ingestion. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestRequest {
    pub files: Vec<UploadedFile>,
}

impl IngestRequest {
    /// Name of the canonical dataset file produced by [`IngestRequest::canonical`].
    pub const DATASET_FILE: &'static str = "dataset.jsonl";

    /// Uploads the normalized examples as a single JSONL file. No examples
    /// means an empty file set.
    pub fn canonical(examples: &[TrainingExample]) -> DatasetResult<Self> {
        if examples.is_empty() {
            return Ok(Self::default());
        }
        let body = to_jsonl(examples)?;
        Ok(Self { files: vec![UploadedFile::new(Self::DATASET_FILE, body.into_bytes())] })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub parsed_count: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub path: String,
    pub examples_count: usize,
    /// Generated examples, when the backend returns them inline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<TrainingExample>,
}

/// Validated training hyperparameters; also the Train request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub base_model: String,
    pub lora_type: LoraType,
    pub num_epochs: u32,
    pub lr: f64,
    pub batch_size: u32,
    pub grad_accum_steps: u32,
    pub max_seq_len: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainResponse {
    pub job_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalRequest {
    pub base_model: String,
    pub adapter_path: String,
    pub prompts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResult {
    pub prompt: String,
    #[serde(alias = "output")]
    pub completion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResponse {
    pub results: Vec<EvalResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub card_path: String,
    #[serde(default)]
    pub card_summary: Value,
}

/// One submitted backend operation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    EnvProbe,
    Ingest(IngestRequest),
    Caption(CaptionRequest),
    Train(TrainConfig),
    Evaluate(EvalRequest),
    ExportCard,
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::EnvProbe => JobKind::EnvProbe,
            Self::Ingest(_) => JobKind::Ingest,
            Self::Caption(_) => JobKind::Caption,
            Self::Train(_) => JobKind::Train,
            Self::Evaluate(_) => JobKind::Evaluate,
            Self::ExportCard => JobKind::ExportCard,
        }
    }
}

/// Typed success payload for each operation.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResponse {
    EnvProbe(EnvInfo),
    Ingest(IngestResponse),
    Caption(CaptionResponse),
    Train(TrainResponse),
    Evaluate(EvalResponse),
    ExportCard(ModelCard),
}

impl JobResponse {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::EnvProbe(_) => JobKind::EnvProbe,
            Self::Ingest(_) => JobKind::Ingest,
            Self::Caption(_) => JobKind::Caption,
            Self::Train(_) => JobKind::Train,
            Self::Evaluate(_) => JobKind::Evaluate,
            Self::ExportCard(_) => JobKind::ExportCard,
        }
    }
}
