//! `lorakit env`: one-shot environment probe.

use anyhow::{Context, Result, anyhow};
use lorakit_client::JobKind;
use lorakit_core::ConsoleConfig;

pub async fn execute(config: &ConsoleConfig) -> Result<()> {
    let mut workflow = super::workflow(config);
    workflow.probe_env()?;

    let resolution = workflow
        .await_job(JobKind::EnvProbe)
        .await
        .context("environment probe was not started")?;
    if let Some(failure) = resolution.failure {
        return Err(match failure.hint() {
            Some(hint) => anyhow!("{failure}\n{hint}"),
            None => anyhow!(failure),
        });
    }

    let env = workflow
        .state()
        .env_info
        .as_ref()
        .context("backend returned no environment")?;
    println!("{}", serde_json::to_string_pretty(env)?);
    Ok(())
}
