//! Workflow stages and the state accumulated across them.

use crate::forms::{EvalForm, TrainForm};
use lorakit_client::{CaptionResponse, EnvInfo, EvalResponse, IngestResponse, ModelCard, TrainResponse};
use lorakit_dataset::{DatasetDraft, TrainingExample};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five console stages, in order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Environment,
    Data,
    Settings,
    Training,
    Evaluation,
}

impl Stage {
    pub const ALL: [Stage; 5] = [Self::Environment, Self::Data, Self::Settings, Self::Training, Self::Evaluation];

    /// 1-based stage number as shown to the operator.
    pub fn number(self) -> u8 {
        match self {
            Self::Environment => 1,
            Self::Data => 2,
            Self::Settings => 3,
            Self::Training => 4,
            Self::Evaluation => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.number() == n)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Environment => "Environment & Machine",
            Self::Data => "Data Creation/Ingestion",
            Self::Settings => "Model & Settings",
            Self::Training => "Training",
            Self::Evaluation => "Evaluation & Export",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.label())
    }
}

/// Current stage plus the furthest stage ever reached.
///
/// Only an explicit advance moves forward; revisiting any reached stage is
/// always allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCursor {
    current: Stage,
    furthest: Stage,
}

impl StageCursor {
    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn furthest(&self) -> Stage {
        self.furthest
    }

    /// Moves to the next stage. A no-op on the last stage.
    pub fn advance(&mut self) -> Stage {
        if let Some(next) = self.current.next() {
            self.current = next;
            self.furthest = self.furthest.max(next);
        }
        self.current
    }

    /// Jumps back to an already reached stage. Returns false for stages
    /// beyond the furthest one reached.
    pub fn revisit(&mut self, stage: Stage) -> bool {
        if stage > self.furthest {
            return false;
        }
        self.current = stage;
        true
    }
}

/// Everything the console has gathered so far.
///
/// Backend-derived fields are written only by the controller when a job
/// succeeds; forms and the draft are edited through stage props.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub cursor: StageCursor,
    pub env_info: Option<EnvInfo>,
    pub dataset_draft: DatasetDraft,
    /// Reference to the dataset the backend accepted.
    pub dataset: Option<IngestResponse>,
    pub caption: Option<CaptionResponse>,
    /// Rows generated from the draft's document by the last caption job.
    pub captioned_examples: Vec<TrainingExample>,
    /// The document text the caption result was produced from.
    pub captioned_document: Option<String>,
    pub train_form: TrainForm,
    pub last_train_result: Option<TrainResponse>,
    pub eval_form: EvalForm,
    pub last_eval_result: Option<EvalResponse>,
    pub model_card: Option<ModelCard>,
}

impl WorkflowState {
    /// True when the caption result belongs to the draft's current document.
    /// A cleared or replaced document makes it stale.
    pub fn caption_is_current(&self) -> bool {
        self.caption.is_some()
            && self.dataset_draft.document.is_some()
            && self.captioned_document == self.dataset_draft.document
    }

    /// The caption result and its rows, unless the document changed since.
    pub fn current_caption(&self) -> Option<(&CaptionResponse, &[TrainingExample])> {
        if !self.caption_is_current() {
            return None;
        }
        self.caption.as_ref().map(|caption| (caption, self.captioned_examples.as_slice()))
    }
}
