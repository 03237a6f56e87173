//! Backend client for the lorakit console.
//!
//! This crate defines the request/response payloads for each backend
//! operation, the `JobClient` trait, and an HTTP implementation.

pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use client::JobClient;
pub use error::{ErrorKind, JobFailure, JobResult};
pub use http::{HttpJobClient, DEFAULT_BACKEND_URL};
pub use lorakit_dataset::CaptionRequest;
pub use types::{
    CaptionResponse, EnvInfo, EvalRequest, EvalResponse, EvalResult, GpuInfo, IngestRequest, IngestResponse, JobKind,
    JobRequest, JobResponse, LoraType, ModelCard, TrainConfig, TrainResponse,
};
