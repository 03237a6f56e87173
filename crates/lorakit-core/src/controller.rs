//! The workflow controller: owns all cross-stage state and the job slots.
//!
//! Stages never talk to each other or to the backend directly. They borrow
//! their slice of [`WorkflowState`] through [`WorkflowController::stage_props`]
//! and submit operations through the controller. Job results are merged into
//! the state only when a completion is applied, at one named merge point per
//! operation kind.

use crate::error::{SubmitError, ValidationError};
use crate::forms::{EvalForm, TrainForm};
use crate::jobs::{Completion, JobController, JobTimeouts};
use crate::slot::{JobSlot, Ticket};
use crate::state::{Stage, StageCursor, WorkflowState};
use lorakit_client::{
    CaptionResponse, EnvInfo, EvalResponse, IngestRequest, IngestResponse, JobClient, JobFailure, JobKind, JobRequest,
    JobResponse, ModelCard, TrainResponse,
};
use lorakit_dataset::{DatasetDraft, ExampleNormalizer, NormalizedDataset, TrainingExample};
use std::sync::Arc;
use tracing::{info, warn};

/// How a job ended, after its result was merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub kind: JobKind,
    pub ticket: Ticket,
    pub failure: Option<JobFailure>,
}

impl Resolution {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// The part of [`WorkflowState`] a stage may read and edit.
#[derive(Debug)]
pub enum StageSlice<'a> {
    Environment {
        env_info: Option<&'a EnvInfo>,
    },
    Data {
        draft: &'a mut DatasetDraft,
        dataset: Option<&'a IngestResponse>,
        caption: Option<&'a CaptionResponse>,
        captioned_examples: &'a [TrainingExample],
    },
    Settings {
        train_form: &'a mut TrainForm,
        env_info: Option<&'a EnvInfo>,
    },
    Training {
        train_form: &'a TrainForm,
        last_train_result: Option<&'a TrainResponse>,
    },
    Evaluation {
        eval_form: &'a mut EvalForm,
        last_train_result: Option<&'a TrainResponse>,
        last_eval_result: Option<&'a EvalResponse>,
        model_card: Option<&'a ModelCard>,
    },
}

/// Moves the workflow to the next stage when the operator asks for it.
#[derive(Debug)]
pub struct Advance<'a> {
    cursor: &'a mut StageCursor,
}

impl Advance<'_> {
    /// Same as [`WorkflowController::advance`].
    pub fn advance(self) -> Stage {
        let to = self.cursor.advance();
        info!(stage = %to, "advanced");
        to
    }
}

#[derive(Debug)]
pub struct StageProps<'a> {
    pub stage: Stage,
    pub slice: StageSlice<'a>,
    pub on_next: Advance<'a>,
}

pub struct WorkflowController {
    state: WorkflowState,
    jobs: JobController,
    normalizer: ExampleNormalizer,
    /// Document text of the caption job in flight.
    caption_source: Option<String>,
}

impl WorkflowController {
    pub fn new(client: Arc<dyn JobClient>, timeouts: JobTimeouts) -> Self {
        Self {
            state: WorkflowState::default(),
            jobs: JobController::new(client, timeouts),
            normalizer: ExampleNormalizer::default(),
            caption_source: None,
        }
    }

    /// Replaces the initial form values.
    #[must_use]
    pub fn with_forms(mut self, train_form: TrainForm, eval_form: EvalForm) -> Self {
        self.state.train_form = train_form;
        self.state.eval_form = eval_form;
        self
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: ExampleNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn current_stage(&self) -> Stage {
        self.state.cursor.current()
    }

    pub fn furthest_stage(&self) -> Stage {
        self.state.cursor.furthest()
    }

    pub fn slot(&self, kind: JobKind) -> &JobSlot {
        self.jobs.slot(kind)
    }

    pub fn slots(&self) -> impl Iterator<Item = &JobSlot> {
        self.jobs.slots()
    }

    pub fn timeouts(&self) -> JobTimeouts {
        self.jobs.timeouts()
    }

    /// Moves to the next stage. Never blocked by missing data; a no-op on
    /// the last stage.
    pub fn advance(&mut self) -> Stage {
        let to = self.state.cursor.advance();
        info!(stage = %to, "advanced");
        to
    }

    /// Returns to a stage already reached. Nothing is cleared.
    pub fn revisit(&mut self, stage: Stage) -> bool {
        let moved = self.state.cursor.revisit(stage);
        if moved {
            info!(%stage, "revisiting stage");
        }
        moved
    }

    /// Notes about what is missing for the stages ahead. Advancing is never
    /// blocked by them.
    pub fn advance_advisories(&self) -> Vec<&'static str> {
        let state = &self.state;
        let mut notes = Vec::new();
        match state.cursor.current() {
            Stage::Environment => {
                if state.env_info.is_none() {
                    notes.push("The environment has not been probed yet.");
                }
            }
            Stage::Data => {
                if state.dataset.is_none() {
                    notes.push("No dataset has been ingested yet; training will use whatever the backend already has.");
                }
                if state.dataset_draft.document.is_some() && !state.caption_is_current() {
                    notes.push("The document has not been captioned, so it is not part of the dataset.");
                }
            }
            Stage::Settings => {
                if state.train_form.validate().is_err() {
                    notes.push("The training settings are not valid yet.");
                }
            }
            Stage::Training => {
                if state.last_train_result.is_none() {
                    notes.push("No training run has completed yet.");
                }
            }
            Stage::Evaluation => {}
        }
        notes
    }

    /// Hands `stage` its slice of the state plus an advance handle. A caption
    /// result for a document that has since changed is left out.
    pub fn stage_props(&mut self, stage: Stage) -> StageProps<'_> {
        let caption_is_current = self.state.caption_is_current();
        let WorkflowState {
            cursor,
            env_info,
            dataset_draft,
            dataset,
            caption,
            captioned_examples,
            captioned_document: _,
            train_form,
            last_train_result,
            eval_form,
            last_eval_result,
            model_card,
        } = &mut self.state;

        let slice = match stage {
            Stage::Environment => StageSlice::Environment { env_info: env_info.as_ref() },
            Stage::Data => StageSlice::Data {
                draft: dataset_draft,
                dataset: dataset.as_ref(),
                caption: caption.as_ref().filter(|_| caption_is_current),
                captioned_examples: if caption_is_current { captioned_examples.as_slice() } else { &[] },
            },
            Stage::Settings => StageSlice::Settings { train_form, env_info: env_info.as_ref() },
            Stage::Training => StageSlice::Training { train_form, last_train_result: last_train_result.as_ref() },
            Stage::Evaluation => StageSlice::Evaluation {
                eval_form,
                last_train_result: last_train_result.as_ref(),
                last_eval_result: last_eval_result.as_ref(),
                model_card: model_card.as_ref(),
            },
        };

        StageProps { stage, slice, on_next: Advance { cursor } }
    }

    /// Normalizes the current draft. Captioned document rows are spliced in
    /// only while the draft still holds the document they came from.
    pub fn normalized_dataset(&self) -> NormalizedDataset {
        let mut dataset = self.normalizer.normalize(&self.state.dataset_draft);
        if let Some((_, rows)) = self.state.current_caption() {
            dataset.splice_document(rows.iter().cloned());
        }
        dataset
    }

    pub fn probe_env(&mut self) -> Result<Ticket, SubmitError> {
        self.submit(JobRequest::EnvProbe)
    }

    /// Uploads the normalized dataset as a single canonical file.
    pub fn ingest_dataset(&mut self) -> Result<Ticket, SubmitError> {
        self.ensure_idle(JobKind::Ingest)?;
        let dataset = self.normalized_dataset();
        let request = IngestRequest::canonical(&dataset.examples)
            .map_err(|e| ValidationError::new("dataset", e.to_string()))?;
        self.submit(JobRequest::Ingest(request))
    }

    pub fn caption_document(&mut self) -> Result<Ticket, SubmitError> {
        let request = ExampleNormalizer::caption_request(&self.state.dataset_draft)
            .ok_or(SubmitError::NothingToSubmit("no document to caption"))?;
        let text = request.text.clone();
        let ticket = self.submit(JobRequest::Caption(request))?;
        self.caption_source = Some(text);
        Ok(ticket)
    }

    pub fn start_training(&mut self) -> Result<Ticket, SubmitError> {
        self.ensure_idle(JobKind::Train)?;
        let config = self.state.train_form.validate()?;
        self.submit(JobRequest::Train(config))
    }

    pub fn run_evaluation(&mut self) -> Result<Ticket, SubmitError> {
        self.ensure_idle(JobKind::Evaluate)?;
        let trained = self.state.last_train_result.as_ref().and_then(|r| r.adapter_path.as_deref());
        let request = self.state.eval_form.validate(trained)?;
        self.submit(JobRequest::Evaluate(request))
    }

    pub fn export_card(&mut self) -> Result<Ticket, SubmitError> {
        self.submit(JobRequest::ExportCard)
    }

    /// Submits a prebuilt request to its slot.
    pub fn submit(&mut self, request: JobRequest) -> Result<Ticket, SubmitError> {
        let kind = request.kind();
        self.jobs.submit(request).inspect_err(|e| warn!(%kind, error = %e, "submission rejected"))
    }

    fn ensure_idle(&self, kind: JobKind) -> Result<(), SubmitError> {
        if self.jobs.slot(kind).is_pending() {
            warn!(%kind, "submission rejected while a request is in flight");
            return Err(SubmitError::Busy(kind));
        }
        Ok(())
    }

    /// Waits for the next job to finish and merges its result. Returns
    /// `None` when nothing is in flight.
    pub async fn next_resolution(&mut self) -> Option<Resolution> {
        let completion = self.jobs.next_completion().await?;
        Some(self.merge(completion))
    }

    /// Waits for `kind`'s in-flight job. Other jobs that finish meanwhile
    /// are merged on the next `next_resolution`/`poll_resolutions`.
    pub async fn await_job(&mut self, kind: JobKind) -> Option<Resolution> {
        let completion = self.jobs.await_slot(kind).await?;
        Some(self.merge(completion))
    }

    /// Merges every job that has already finished.
    pub fn poll_resolutions(&mut self) -> Vec<Resolution> {
        self.jobs
            .poll_completions()
            .into_iter()
            .map(|completion| self.merge(completion))
            .collect()
    }

    /// Writes a successful result into its field. Failures leave the state
    /// as it was.
    fn merge(&mut self, completion: Completion) -> Resolution {
        let Completion { kind, ticket, result } = completion;
        let failure = match result {
            Ok(response) => {
                self.apply(response);
                None
            }
            Err(failure) => Some(failure),
        };
        Resolution { kind, ticket, failure }
    }

    fn apply(&mut self, response: JobResponse) {
        let state = &mut self.state;
        match response {
            JobResponse::EnvProbe(env) => state.env_info = Some(env),
            JobResponse::Ingest(dataset) => state.dataset = Some(dataset),
            JobResponse::Caption(caption) => {
                state.captioned_examples.clone_from(&caption.examples);
                state.captioned_document = self.caption_source.take();
                state.caption = Some(caption);
            }
            JobResponse::Train(result) => state.last_train_result = Some(result),
            JobResponse::Evaluate(result) => state.last_eval_result = Some(result),
            JobResponse::ExportCard(card) => state.model_card = Some(card),
        }
    }
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController")
            .field("state", &self.state)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}
