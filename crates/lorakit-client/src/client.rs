use crate::error::JobResult;
use crate::types::{
    CaptionResponse, EnvInfo, EvalRequest, EvalResponse, IngestRequest, IngestResponse, JobRequest, JobResponse,
    ModelCard, TrainConfig, TrainResponse,
};
use async_trait::async_trait;
use lorakit_dataset::CaptionRequest;

/// Typed boundary to the training backend.
///
/// One method per backend operation. Every call is a single fresh exchange:
/// implementations must not retry, cache, or panic, and every failure is
/// reported as a [`JobFailure`](crate::JobFailure).
#[async_trait]
pub trait JobClient: Send + Sync {
    async fn probe_env(&self) -> JobResult<EnvInfo>;

    async fn ingest(&self, request: &IngestRequest) -> JobResult<IngestResponse>;

    async fn caption(&self, request: &CaptionRequest) -> JobResult<CaptionResponse>;

    async fn train(&self, config: &TrainConfig) -> JobResult<TrainResponse>;

    async fn evaluate(&self, request: &EvalRequest) -> JobResult<EvalResponse>;

    async fn export_card(&self) -> JobResult<ModelCard>;

    /// Routes a tagged request to the matching operation.
    async fn dispatch(&self, request: JobRequest) -> JobResult<JobResponse> {
        match request {
            JobRequest::EnvProbe => self.probe_env().await.map(JobResponse::EnvProbe),
            JobRequest::Ingest(req) => self.ingest(&req).await.map(JobResponse::Ingest),
            JobRequest::Caption(req) => self.caption(&req).await.map(JobResponse::Caption),
            JobRequest::Train(config) => self.train(&config).await.map(JobResponse::Train),
            JobRequest::Evaluate(req) => self.evaluate(&req).await.map(JobResponse::Evaluate),
            JobRequest::ExportCard => self.export_card().await.map(JobResponse::ExportCard),
        }
    }
}
