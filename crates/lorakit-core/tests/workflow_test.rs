//! Workflow controller tests against an in-memory backend.

use async_trait::async_trait;
use lorakit_client::{
    CaptionRequest, CaptionResponse, EnvInfo, ErrorKind, EvalRequest, EvalResponse, EvalResult, IngestRequest,
    IngestResponse, JobClient, JobFailure, JobKind, JobResponse, JobResult, LoraType, ModelCard, TrainConfig,
    TrainResponse,
};
use lorakit_core::{JobTimeouts, SlotState, Stage, StageSlice, SubmitError, WorkflowController};
use lorakit_dataset::{TrainingExample, UploadedFile};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// One scripted backend reply. A gated reply waits for `Notify::notify_one`.
struct Reply {
    gate: Option<Arc<Notify>>,
    result: JobResult<JobResponse>,
}

#[derive(Default)]
struct FakeBackend {
    replies: Mutex<HashMap<JobKind, VecDeque<Reply>>>,
    calls: Mutex<HashMap<JobKind, usize>>,
    train_configs: Mutex<Vec<TrainConfig>>,
    ingested: Mutex<Vec<IngestRequest>>,
    eval_requests: Mutex<Vec<EvalRequest>>,
}

impl FakeBackend {
    fn reply(&self, kind: JobKind, result: JobResult<JobResponse>) {
        self.push(kind, Reply { gate: None, result });
    }

    fn gated_reply(&self, kind: JobKind, result: JobResult<JobResponse>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(kind, Reply { gate: Some(Arc::clone(&gate)), result });
        gate
    }

    /// A reply that never arrives.
    fn hang(&self, kind: JobKind) {
        self.push(kind, Reply { gate: Some(Arc::new(Notify::new())), result: Err(JobFailure::network("unused")) });
    }

    fn push(&self, kind: JobKind, reply: Reply) {
        self.replies.lock().unwrap().entry(kind).or_default().push_back(reply);
    }

    fn calls(&self, kind: JobKind) -> usize {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    async fn next(&self, kind: JobKind) -> JobResult<JobResponse> {
        *self.calls.lock().unwrap().entry(kind).or_default() += 1;
        let reply = self.replies.lock().unwrap().get_mut(&kind).and_then(VecDeque::pop_front);
        let Some(reply) = reply else {
            return Err(JobFailure::network(format!("no scripted reply for {kind}")));
        };
        if let Some(gate) = reply.gate {
            gate.notified().await;
        }
        reply.result
    }
}

fn unexpected(response: &JobResponse) -> JobFailure {
    JobFailure::bad_response(format!("unexpected {:?} payload", response.kind()))
}

#[async_trait]
impl JobClient for FakeBackend {
    async fn probe_env(&self) -> JobResult<EnvInfo> {
        match self.next(JobKind::EnvProbe).await? {
            JobResponse::EnvProbe(env) => Ok(env),
            other => Err(unexpected(&other)),
        }
    }

    async fn ingest(&self, request: &IngestRequest) -> JobResult<IngestResponse> {
        self.ingested.lock().unwrap().push(request.clone());
        match self.next(JobKind::Ingest).await? {
            JobResponse::Ingest(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    async fn caption(&self, _request: &CaptionRequest) -> JobResult<CaptionResponse> {
        match self.next(JobKind::Caption).await? {
            JobResponse::Caption(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    async fn train(&self, config: &TrainConfig) -> JobResult<TrainResponse> {
        self.train_configs.lock().unwrap().push(config.clone());
        match self.next(JobKind::Train).await? {
            JobResponse::Train(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    async fn evaluate(&self, request: &EvalRequest) -> JobResult<EvalResponse> {
        self.eval_requests.lock().unwrap().push(request.clone());
        match self.next(JobKind::Evaluate).await? {
            JobResponse::Evaluate(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    async fn export_card(&self) -> JobResult<ModelCard> {
        match self.next(JobKind::ExportCard).await? {
            JobResponse::ExportCard(card) => Ok(card),
            other => Err(unexpected(&other)),
        }
    }
}

fn controller(backend: &Arc<FakeBackend>) -> WorkflowController {
    let client: Arc<dyn JobClient> = Arc::clone(backend) as Arc<dyn JobClient>;
    WorkflowController::new(client, JobTimeouts::default())
}

fn queued() -> JobResponse {
    JobResponse::Train(TrainResponse { job_status: "queued".to_string(), metrics: None, adapter_path: None })
}

#[tokio::test]
async fn test_second_submission_is_rejected_while_first_is_pending() {
    let backend = Arc::new(FakeBackend::default());
    let gate = backend.gated_reply(JobKind::Train, Ok(queued()));
    let mut workflow = controller(&backend);

    let first = workflow.start_training().unwrap();
    let second = workflow.start_training();
    assert_eq!(second, Err(SubmitError::Busy(JobKind::Train)));
    assert_eq!(workflow.slot(JobKind::Train).pending_ticket(), Some(first));

    gate.notify_one();
    let resolution = workflow.await_job(JobKind::Train).await.unwrap();
    assert_eq!(resolution.ticket, first);
    assert!(resolution.succeeded());
    assert_eq!(backend.calls(JobKind::Train), 1);
    assert!(matches!(workflow.slot(JobKind::Train).state(), SlotState::Succeeded { ticket, .. } if *ticket == first));
}

#[tokio::test]
async fn test_failure_keeps_previous_success() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Train, Ok(queued()));
    backend.reply(JobKind::Train, Err(JobFailure::rejected("backend returned 500: CUDA out of memory")));
    let mut workflow = controller(&backend);

    workflow.start_training().unwrap();
    assert!(workflow.await_job(JobKind::Train).await.unwrap().succeeded());

    workflow.start_training().unwrap();
    let resolution = workflow.await_job(JobKind::Train).await.unwrap();
    assert_eq!(resolution.failure.as_ref().map(|f| f.kind), Some(ErrorKind::ServerRejected));

    assert_eq!(workflow.state().last_train_result.as_ref().map(|r| r.job_status.as_str()), Some("queued"));
    assert_eq!(
        workflow.slot(JobKind::Train).last_failure().map(|f| f.message.as_str()),
        Some("backend returned 500: CUDA out of memory")
    );
}

#[tokio::test]
async fn test_train_round_trip_does_not_move_the_stage() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Train, Ok(queued()));
    let mut workflow = controller(&backend);
    workflow.advance();
    workflow.advance();

    {
        let props = workflow.stage_props(Stage::Settings);
        let StageSlice::Settings { train_form, .. } = props.slice else {
            panic!("expected settings slice");
        };
        train_form.base_model = "m".to_string();
        train_form.lora_type = "qlora".to_string();
        train_form.num_epochs = "1".to_string();
        train_form.lr = "0.0002".to_string();
        train_form.batch_size = "1".to_string();
        train_form.grad_accum_steps = "4".to_string();
        train_form.max_seq_len = "2048".to_string();
    }

    workflow.start_training().unwrap();
    workflow.await_job(JobKind::Train).await.unwrap();

    assert_eq!(
        backend.train_configs.lock().unwrap().as_slice(),
        &[TrainConfig {
            base_model: "m".to_string(),
            lora_type: LoraType::QLora,
            num_epochs: 1,
            lr: 0.0002,
            batch_size: 1,
            grad_accum_steps: 4,
            max_seq_len: 2048,
        }]
    );
    assert_eq!(
        workflow.state().last_train_result,
        Some(TrainResponse { job_status: "queued".to_string(), metrics: None, adapter_path: None })
    );
    assert_eq!(workflow.current_stage(), Stage::Settings);

    let props = workflow.stage_props(Stage::Settings);
    assert_eq!(props.on_next.advance(), Stage::Training);
    assert_eq!(workflow.current_stage(), Stage::Training);
}

#[tokio::test]
async fn test_advance_at_last_stage_is_a_no_op() {
    let backend = Arc::new(FakeBackend::default());
    let mut workflow = controller(&backend);
    for _ in 0..4 {
        workflow.advance();
    }
    assert_eq!(workflow.current_stage(), Stage::Evaluation);
    assert_eq!(workflow.advance(), Stage::Evaluation);
    assert_eq!(workflow.current_stage(), Stage::Evaluation);
}

#[tokio::test]
async fn test_revisiting_data_stage_keeps_the_draft() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Ingest, Ok(JobResponse::Ingest(IngestResponse { parsed_count: 2, warnings: vec![] })));
    let mut workflow = controller(&backend);
    workflow.advance();

    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
        let row = draft.add_row();
        draft.set_row(row, TrainingExample::new("What is LoRA?", "A low-rank adapter."));
        draft.add_file(UploadedFile::new("extra.csv", b"question,answer\nq,a\n".to_vec()));
    }
    let draft_before = workflow.state().dataset_draft.clone();

    workflow.ingest_dataset().unwrap();
    assert!(workflow.await_job(JobKind::Ingest).await.unwrap().succeeded());
    workflow.advance();
    workflow.advance();
    assert_eq!(workflow.current_stage(), Stage::Training);

    assert!(workflow.revisit(Stage::Data));
    let props = workflow.stage_props(Stage::Data);
    let StageSlice::Data { draft, dataset, .. } = props.slice else {
        panic!("expected data slice");
    };
    assert_eq!(*draft, draft_before);
    assert_eq!(dataset.map(|d| d.parsed_count), Some(2));
}

#[tokio::test]
async fn test_ingest_uploads_one_canonical_file() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Caption, Ok(JobResponse::Caption(CaptionResponse {
        path: "data/captioned.jsonl".to_string(),
        examples_count: 1,
        examples: vec![TrainingExample::new("Summarize the following text.", "A summary.")],
    })));
    backend.reply(JobKind::Ingest, Ok(JobResponse::Ingest(IngestResponse { parsed_count: 2, warnings: vec![] })));
    let mut workflow = controller(&backend);

    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
        let row = draft.add_row();
        draft.set_row(row, TrainingExample::new("manual", "row"));
        draft.set_document("A long document about adapters.");
    }

    workflow.caption_document().unwrap();
    assert!(workflow.await_job(JobKind::Caption).await.unwrap().succeeded());
    assert_eq!(workflow.state().captioned_examples.len(), 1);

    workflow.ingest_dataset().unwrap();
    workflow.await_job(JobKind::Ingest).await.unwrap();

    let ingested = backend.ingested.lock().unwrap();
    assert_eq!(ingested.len(), 1);
    assert_eq!(ingested[0].files.len(), 1);
    let body = String::from_utf8(ingested[0].files[0].bytes.clone()).unwrap();
    let instructions: Vec<String> = body
        .lines()
        .map(|line| serde_json::from_str::<TrainingExample>(line).unwrap().instruction)
        .collect();
    assert_eq!(instructions, vec!["manual", "Summarize the following text."]);
}

fn caption_reply() -> JobResult<JobResponse> {
    Ok(JobResponse::Caption(CaptionResponse {
        path: "data/captioned.jsonl".to_string(),
        examples_count: 1,
        examples: vec![TrainingExample::new("Summarize the following text.", "A summary.")],
    }))
}

fn ingested_instructions(backend: &FakeBackend) -> Vec<String> {
    let ingested = backend.ingested.lock().unwrap();
    let body = String::from_utf8(ingested.last().unwrap().files[0].bytes.clone()).unwrap();
    body.lines()
        .map(|line| serde_json::from_str::<TrainingExample>(line).unwrap().instruction)
        .collect()
}

#[tokio::test]
async fn test_cleared_document_drops_its_captioned_rows() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Caption, caption_reply());
    backend.reply(JobKind::Ingest, Ok(JobResponse::Ingest(IngestResponse { parsed_count: 2, warnings: vec![] })));
    let mut workflow = controller(&backend);
    workflow.advance();

    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
        let row = draft.add_row();
        draft.set_row(row, TrainingExample::new("manual", "row"));
        draft.set_document("A long document about adapters.");
    }
    workflow.caption_document().unwrap();
    assert!(workflow.await_job(JobKind::Caption).await.unwrap().succeeded());

    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
        draft.set_document("");
        draft.add_file(UploadedFile::new("extra.csv", b"question,answer\nfrom file,a\n".to_vec()));
    }
    let props = workflow.stage_props(Stage::Data);
    let StageSlice::Data { caption, captioned_examples, .. } = props.slice else {
        panic!("expected data slice");
    };
    assert!(caption.is_none());
    assert!(captioned_examples.is_empty());

    workflow.ingest_dataset().unwrap();
    assert!(workflow.await_job(JobKind::Ingest).await.unwrap().succeeded());
    assert_eq!(ingested_instructions(&backend), vec!["manual", "from file"]);
}

#[tokio::test]
async fn test_replaced_document_needs_a_new_caption() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Caption, caption_reply());
    let mut workflow = controller(&backend);
    workflow.advance();

    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
        draft.set_document("The first document.");
    }
    workflow.caption_document().unwrap();
    workflow.await_job(JobKind::Caption).await.unwrap();
    assert!(workflow.state().caption_is_current());

    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
        draft.set_document("A different document.");
    }
    assert!(!workflow.state().caption_is_current());
    assert_eq!(workflow.normalized_dataset().document_rows(), 0);

    let notes = workflow.advance_advisories();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().any(|note| note.contains("ingested")));
    assert!(notes.iter().any(|note| note.contains("captioned")));
}

#[tokio::test]
async fn test_caption_without_document_sends_nothing() {
    let backend = Arc::new(FakeBackend::default());
    let mut workflow = controller(&backend);

    assert!(matches!(workflow.caption_document(), Err(SubmitError::NothingToSubmit(_))));
    assert_eq!(backend.calls(JobKind::Caption), 0);
    assert_eq!(workflow.slot(JobKind::Caption).state(), &SlotState::Idle);
}

#[tokio::test]
async fn test_invalid_hyperparameters_send_no_request() {
    let backend = Arc::new(FakeBackend::default());
    let mut workflow = controller(&backend);

    if let StageSlice::Settings { train_form, .. } = workflow.stage_props(Stage::Settings).slice {
        train_form.lr = "abc".to_string();
    }

    let err = workflow.start_training().unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(ref e) if e.field == "lr"));
    tokio::task::yield_now().await;
    assert_eq!(backend.calls(JobKind::Train), 0);
    assert_eq!(workflow.slot(JobKind::Train).state(), &SlotState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_resolves_to_failed_timeout() {
    let backend = Arc::new(FakeBackend::default());
    backend.hang(JobKind::EnvProbe);
    let mut workflow = controller(&backend);

    workflow.probe_env().unwrap();
    let resolution = workflow.await_job(JobKind::EnvProbe).await.unwrap();

    let failure = resolution.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.message, "no response after 60s");
    assert!(workflow.state().env_info.is_none());
    assert!(!workflow.slot(JobKind::EnvProbe).is_pending());
}

#[tokio::test]
async fn test_abandoned_wait_is_merged_later() {
    let backend = Arc::new(FakeBackend::default());
    let gate = backend.gated_reply(JobKind::ExportCard, Ok(JobResponse::ExportCard(ModelCard {
        card_path: "outputs/MODEL_CARD.md".to_string(),
        card_summary: serde_json::json!({"base_model": "m"}),
    })));
    let mut workflow = controller(&backend);

    workflow.export_card().unwrap();
    let waited = tokio::time::timeout(Duration::from_millis(10), workflow.await_job(JobKind::ExportCard)).await;
    assert!(waited.is_err());
    assert!(workflow.slot(JobKind::ExportCard).is_pending());
    assert!(matches!(workflow.export_card(), Err(SubmitError::Busy(JobKind::ExportCard))));

    gate.notify_one();
    let resolution = workflow.next_resolution().await.unwrap();
    assert_eq!(resolution.kind, JobKind::ExportCard);
    assert_eq!(
        workflow.state().model_card.as_ref().map(|c| c.card_path.as_str()),
        Some("outputs/MODEL_CARD.md")
    );
    assert!(workflow.next_resolution().await.is_none());
}

#[tokio::test]
async fn test_other_slots_finish_while_awaiting_one() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::EnvProbe, Ok(JobResponse::EnvProbe(EnvInfo {
        platform: "posix".to_string(),
        cuda_available: true,
        ..EnvInfo::default()
    })));
    let gate = backend.gated_reply(JobKind::Evaluate, Ok(JobResponse::Evaluate(EvalResponse {
        results: vec![EvalResult { prompt: "hi".to_string(), completion: "hello".to_string() }],
    })));
    let mut workflow = controller(&backend);

    if let StageSlice::Evaluation { eval_form, .. } = workflow.stage_props(Stage::Evaluation).slice {
        eval_form.prompts = "hi\n".to_string();
    }
    workflow.run_evaluation().unwrap();
    workflow.probe_env().unwrap();

    // Let both tasks start so the probe reports before evaluation is released.
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    gate.notify_one();
    let resolution = workflow.await_job(JobKind::Evaluate).await.unwrap();
    assert!(resolution.succeeded());
    assert_eq!(workflow.state().last_eval_result.as_ref().map(|r| r.results.len()), Some(1));

    let deferred = workflow.poll_resolutions();
    assert_eq!(deferred.iter().map(|r| r.kind).collect::<Vec<_>>(), vec![JobKind::EnvProbe]);
    assert!(workflow.state().env_info.as_ref().is_some_and(|e| e.cuda_available));
}

#[tokio::test]
async fn test_evaluation_uses_trained_adapter_when_blank() {
    let backend = Arc::new(FakeBackend::default());
    backend.reply(JobKind::Train, Ok(JobResponse::Train(TrainResponse {
        job_status: "completed".to_string(),
        metrics: None,
        adapter_path: Some("outputs/adapters/run-3".to_string()),
    })));
    backend.reply(JobKind::Evaluate, Ok(JobResponse::Evaluate(EvalResponse::default())));
    let mut workflow = controller(&backend);

    workflow.start_training().unwrap();
    workflow.await_job(JobKind::Train).await.unwrap();

    if let StageSlice::Evaluation { eval_form, .. } = workflow.stage_props(Stage::Evaluation).slice {
        eval_form.adapter_path.clear();
        eval_form.prompts = "Explain LoRA.".to_string();
    }
    workflow.run_evaluation().unwrap();
    workflow.await_job(JobKind::Evaluate).await.unwrap();

    assert_eq!(backend.eval_requests.lock().unwrap()[0].adapter_path, "outputs/adapters/run-3");
}

#[test]
fn test_submit_outside_runtime_is_rejected() {
    let backend = Arc::new(FakeBackend::default());
    let mut workflow = controller(&backend);

    assert_eq!(workflow.probe_env(), Err(SubmitError::NoRuntime));
    assert_eq!(workflow.slot(JobKind::EnvProbe).state(), &SlotState::Idle);
}

#[tokio::test]
async fn test_advisories_do_not_block_advance() {
    let backend = Arc::new(FakeBackend::default());
    let mut workflow = controller(&backend);

    assert!(!workflow.advance_advisories().is_empty());
    assert_eq!(workflow.advance(), Stage::Data);
    assert!(!workflow.advance_advisories().is_empty());
    assert_eq!(workflow.advance(), Stage::Settings);
}
