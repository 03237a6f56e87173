//! HTTP implementation of [`JobClient`].
//!
//! Talks to the training backend's JSON API:
//! `GET /env`, `POST /ingest` (multipart), `POST /caption`, `POST /train`,
//! `POST /eval` and `GET /export/card`.

use crate::client::JobClient;
use crate::error::{ErrorKind, JobFailure, JobResult};
use crate::types::{
    CaptionResponse, EnvInfo, EvalRequest, EvalResponse, IngestRequest, IngestResponse, ModelCard, TrainConfig,
    TrainResponse,
};
use async_trait::async_trait;
use lorakit_dataset::CaptionRequest;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

/// Default backend address used when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct HttpJobClient {
    /// Backend base URL without a trailing slash.
    base_url: String,
    client: Client,
}

impl HttpJobClient {
    /// Creates a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a client with a preconfigured reqwest `Client`.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn exchange<T: DeserializeOwned>(&self, operation: &'static str, request: RequestBuilder) -> JobResult<T> {
        debug!(operation, base_url = %self.base_url, "sending backend request");

        let response = request.send().await.map_err(|e| self.transport_failure(operation, &e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_failure(operation, &e))?;

        if !status.is_success() {
            error!(operation, status = %status, body = %body, "backend returned error status");
            return Err(JobFailure::rejected(format!(
                "backend returned {}: {}",
                status.as_u16(),
                rejection_message(&body).unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(operation, error = %e, "failed to parse backend response");
            JobFailure::bad_response(format!("unexpected {operation} response: {e}"))
        })
    }

    fn transport_failure(&self, operation: &'static str, e: &reqwest::Error) -> JobFailure {
        error!(operation, error = %e, base_url = %self.base_url, "backend request failed");
        if e.is_timeout() {
            JobFailure::new(ErrorKind::Timeout, format!("{operation} request timed out"))
        } else if e.is_connect() {
            JobFailure::network(format!("backend not reachable at {}", self.base_url))
        } else {
            JobFailure::network(format!("network error: {e}"))
        }
    }
}

/// Pulls a human-readable message out of a structured error body.
fn rejection_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
        return Some(body.to_string());
    };
    let detail = ["detail", "error", "message"].iter().find_map(|key| obj.get(*key));
    Some(match detail {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => body.to_string(),
    })
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn probe_env(&self) -> JobResult<EnvInfo> {
        self.exchange("env", self.client.get(self.url("/env"))).await
    }

    async fn ingest(&self, request: &IngestRequest) -> JobResult<IngestResponse> {
        let mut form = Form::new();
        if request.files.is_empty() {
            // The backend expects the `files` field even when nothing is uploaded.
            form = form.part("files", Part::bytes(Vec::new()).file_name("blob"));
        }
        for file in &request.files {
            form = form.part("files", Part::bytes(file.bytes.clone()).file_name(file.name.clone()));
        }

        self.exchange("ingest", self.client.post(self.url("/ingest")).multipart(form)).await
    }

    async fn caption(&self, request: &CaptionRequest) -> JobResult<CaptionResponse> {
        self.exchange("caption", self.client.post(self.url("/caption")).json(request)).await
    }

    async fn train(&self, config: &TrainConfig) -> JobResult<TrainResponse> {
        self.exchange("train", self.client.post(self.url("/train")).json(config)).await
    }

    async fn evaluate(&self, request: &EvalRequest) -> JobResult<EvalResponse> {
        self.exchange("eval", self.client.post(self.url("/eval")).json(request)).await
    }

    async fn export_card(&self) -> JobResult<ModelCard> {
        self.exchange("export card", self.client.get(self.url("/export/card"))).await
    }
}
