//! lorakit core
//!
//! Workflow state and job orchestration for the lorakit console:
//! - `JobSlot` / `JobController`: one in-flight backend request per
//!   operation kind, run as background tasks with timeouts
//! - `WorkflowController`: the five-stage cursor, shared state, stage props
//!   and the merge point for each job result
//! - stage forms with pre-submission validation
//! - layered console configuration

pub mod config;
pub mod controller;
pub mod error;
pub mod forms;
pub mod jobs;
pub mod slot;
pub mod state;

pub use config::{ConsoleConfig, FormDefaults, TimeoutConfig, ENV_BACKEND_URL, ENV_LOG_LEVEL};
pub use controller::{Advance, Resolution, StageProps, StageSlice, WorkflowController};
pub use error::{ConfigError, ConfigResult, SubmitError, ValidationError};
pub use forms::{EvalForm, TrainField, TrainForm, DEFAULT_ADAPTER_PATH, DEFAULT_BASE_MODEL};
pub use jobs::{Completion, JobController, JobTimeouts};
pub use slot::{JobSlot, SlotState, Ticket};
pub use state::{Stage, StageCursor, WorkflowState};
