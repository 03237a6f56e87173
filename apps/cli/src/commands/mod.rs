//! CLI command implementations.

pub mod console;
pub mod env;
pub mod normalize;

use lorakit_client::{HttpJobClient, JobClient};
use lorakit_core::{ConsoleConfig, WorkflowController};
use std::sync::Arc;

/// Builds a workflow controller talking to the configured backend.
pub fn workflow(config: &ConsoleConfig) -> WorkflowController {
    let client: Arc<dyn JobClient> = Arc::new(HttpJobClient::new(config.backend_url()));
    WorkflowController::new(client, config.timeouts.job_timeouts())
        .with_forms(config.defaults.train_form(), config.defaults.eval_form())
}
