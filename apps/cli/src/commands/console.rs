//! `lorakit console`: the interactive five-stage workflow.
//!
//! Prompts run on the blocking pool so backend jobs keep making progress on
//! the runtime thread while the operator is typing.

use crate::render;
use anyhow::{Context, Result};
use colored::Colorize;
use inquire::{Confirm, InquireError, Select, Text};
use lorakit_client::JobKind;
use lorakit_core::{ConsoleConfig, Stage, StageSlice, SubmitError, TrainField, Ticket, WorkflowController};
use lorakit_dataset::{TrainingExample, UploadedFile};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ProbeEnv,
    AddRow,
    EditRow,
    RemoveRow,
    AddFile,
    RemoveFile,
    LoadDocument,
    ClearDocument,
    Preview,
    Caption,
    Ingest,
    EditSetting,
    CheckSettings,
    Train,
    EditEvalModel,
    EditAdapter,
    EditPrompts,
    Evaluate,
    ExportCard,
    Wait,
    Next,
    Back(Stage),
    Quit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeEnv => f.write_str("Probe environment"),
            Self::AddRow => f.write_str("Add row"),
            Self::EditRow => f.write_str("Edit row"),
            Self::RemoveRow => f.write_str("Remove row"),
            Self::AddFile => f.write_str("Add file"),
            Self::RemoveFile => f.write_str("Remove file"),
            Self::LoadDocument => f.write_str("Load document to caption"),
            Self::ClearDocument => f.write_str("Clear document"),
            Self::Preview => f.write_str("Preview normalized dataset"),
            Self::Caption => f.write_str("Caption document"),
            Self::Ingest => f.write_str("Ingest dataset"),
            Self::EditSetting => f.write_str("Edit a setting"),
            Self::CheckSettings => f.write_str("Check settings"),
            Self::Train => f.write_str("Start training"),
            Self::EditEvalModel => f.write_str("Edit base model"),
            Self::EditAdapter => f.write_str("Edit adapter path"),
            Self::EditPrompts => f.write_str("Edit prompts"),
            Self::Evaluate => f.write_str("Run evaluation"),
            Self::ExportCard => f.write_str("Export model card"),
            Self::Wait => f.write_str("Wait for running jobs"),
            Self::Next => f.write_str("Next stage"),
            Self::Back(stage) => write!(f, "Back to stage {}", stage),
            Self::Quit => f.write_str("Quit"),
        }
    }
}

/// Runs a blocking inquire prompt. Escape or Ctrl+C yields `None`.
async fn ask<T, F>(prompt: F) -> Result<Option<T>>
where
    T: Send + 'static,
    F: FnOnce() -> inquire::error::InquireResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(prompt).await.context("prompt task failed")? {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(e).context("prompt failed"),
    }
}

async fn text(message: impl Into<String>, initial: impl Into<String>) -> Result<Option<String>> {
    let message = message.into();
    let initial = initial.into();
    ask(move || Text::new(&message).with_initial_value(&initial).prompt()).await
}

async fn select<T>(message: impl Into<String>, options: Vec<T>) -> Result<Option<T>>
where
    T: fmt::Display + Send + 'static,
{
    let message = message.into();
    ask(move || Select::new(&message, options).prompt()).await
}

async fn confirm(message: impl Into<String>) -> Result<bool> {
    let message = message.into();
    Ok(ask(move || Confirm::new(&message).with_default(false).prompt()).await?.unwrap_or(false))
}

pub async fn execute(config: &ConsoleConfig) -> Result<()> {
    let mut workflow = super::workflow(config);

    println!();
    println!("{}", "lorakit console".bold().cyan());
    println!("  Backend: {}", config.backend_url().cyan());

    loop {
        for resolution in workflow.poll_resolutions() {
            render::resolution(&resolution, workflow.state());
        }

        let stage = workflow.current_stage();
        render::stage_header(stage, workflow.furthest_stage());
        show_stage(&mut workflow, stage);
        for slot in workflow.slots() {
            render::slot_line(slot);
        }

        let Some(action) = select("Action", actions(&workflow, stage)).await? else {
            if confirm("Quit lorakit?").await? {
                break;
            }
            continue;
        };
        debug!(%action, "console action");

        match action {
            Action::Quit => {
                if !pending_kinds(&workflow).is_empty()
                    && !confirm("Jobs are still running. Quit anyway?").await?
                {
                    continue;
                }
                break;
            }
            Action::Next => {
                for note in workflow.advance_advisories() {
                    println!("  {} {}", "note:".cyan(), note);
                }
                let props = workflow.stage_props(stage);
                props.on_next.advance();
            }
            Action::Back(to) => {
                workflow.revisit(to);
            }
            Action::Wait => wait_any(&mut workflow).await,
            other => run_stage_action(&mut workflow, other).await?,
        }
    }

    Ok(())
}

fn pending_kinds(workflow: &WorkflowController) -> Vec<JobKind> {
    workflow.slots().filter(|s| s.is_pending()).map(|s| s.kind()).collect()
}

fn actions(workflow: &WorkflowController, stage: Stage) -> Vec<Action> {
    let state = workflow.state();
    let mut actions = match stage {
        Stage::Environment => vec![Action::ProbeEnv],
        Stage::Data => {
            let draft = &state.dataset_draft;
            let mut list = vec![Action::AddRow];
            if !draft.rows.is_empty() {
                list.extend([Action::EditRow, Action::RemoveRow]);
            }
            list.push(Action::AddFile);
            if !draft.files.is_empty() {
                list.push(Action::RemoveFile);
            }
            list.push(Action::LoadDocument);
            if draft.document.is_some() {
                list.extend([Action::ClearDocument, Action::Caption]);
            }
            list.extend([Action::Preview, Action::Ingest]);
            list
        }
        Stage::Settings => vec![Action::EditSetting, Action::CheckSettings],
        Stage::Training => vec![Action::Train],
        Stage::Evaluation => vec![
            Action::EditEvalModel,
            Action::EditAdapter,
            Action::EditPrompts,
            Action::Evaluate,
            Action::ExportCard,
        ],
    };

    if !pending_kinds(workflow).is_empty() {
        actions.push(Action::Wait);
    }
    if stage.next().is_some() {
        actions.push(Action::Next);
    }
    actions.extend(
        Stage::ALL
            .into_iter()
            .filter(|s| *s != stage && *s <= workflow.furthest_stage())
            .map(Action::Back),
    );
    actions.push(Action::Quit);
    actions
}

fn show_stage(workflow: &mut WorkflowController, stage: Stage) {
    let props = workflow.stage_props(stage);
    match props.slice {
        StageSlice::Environment { env_info } => match env_info {
            Some(env) => render::env_info(env),
            None => println!("  {}", "Environment not probed yet.".dimmed()),
        },
        StageSlice::Data { draft, dataset, caption, captioned_examples } => {
            println!("{}", "Manual rows".bold());
            render::examples(&draft.rows);
            if !draft.files.is_empty() {
                println!("{}", "Files".bold());
                for file in &draft.files {
                    println!("  {} ({} bytes)", file.display_name(), file.bytes.len());
                }
            }
            if let Some(ref document) = draft.document {
                println!("{} {} characters", "Document:".bold(), document.chars().count());
            }
            if let Some(caption) = caption {
                render::caption_result(caption);
                if !captioned_examples.is_empty() {
                    println!("  {} generated rows will be included", captioned_examples.len());
                }
            }
            if let Some(dataset) = dataset {
                println!("{}", "Last ingest".bold());
                render::ingest(dataset);
            }
        }
        StageSlice::Settings { train_form, env_info } => {
            render::train_form(train_form);
            if let Some(env) = env_info {
                println!(
                    "  {} {} suits this machine",
                    "hint:".cyan(),
                    env.recommended_lora_type().to_string().bold()
                );
            }
        }
        StageSlice::Training { train_form, last_train_result } => {
            render::train_form(train_form);
            if let Some(result) = last_train_result {
                println!("{}", "Last run".bold());
                render::train_result(result);
            }
        }
        StageSlice::Evaluation { eval_form, last_train_result, last_eval_result, model_card } => {
            println!("  {:<18} {}", "base_model".dimmed(), eval_form.base_model);
            let trained = last_train_result.and_then(|r| r.adapter_path.as_deref());
            match (eval_form.adapter_path.trim(), trained) {
                ("", Some(path)) => println!("  {:<18} {} {}", "adapter_path".dimmed(), path, "(from training)".dimmed()),
                (path, _) => println!("  {:<18} {}", "adapter_path".dimmed(), path),
            }
            println!("  {:<18} {}", "prompts".dimmed(), eval_form.prompt_list().len());
            if let Some(result) = last_eval_result {
                println!("{}", "Last evaluation".bold());
                render::eval_results(result);
            }
            if let Some(card) = model_card {
                println!("{}", "Model card".bold());
                render::model_card(card);
            }
        }
    }
}

async fn run_stage_action(workflow: &mut WorkflowController, action: Action) -> Result<()> {
    match action {
        Action::ProbeEnv => submit_and_wait(workflow, JobKind::EnvProbe, WorkflowController::probe_env).await,
        Action::AddRow => {
            if let Some(example) = edit_example(TrainingExample::default()).await? {
                if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                    let index = draft.add_row();
                    draft.set_row(index, example);
                }
            }
        }
        Action::EditRow => {
            if let Some(index) = pick_row(workflow).await? {
                let current = workflow.state().dataset_draft.rows[index].clone();
                if let Some(example) = edit_example(current).await? {
                    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                        draft.set_row(index, example);
                    }
                }
            }
        }
        Action::RemoveRow => {
            if let Some(index) = pick_row(workflow).await? {
                if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                    draft.remove_row(index);
                }
            }
        }
        Action::AddFile => {
            if let Some(path) = text("File path", "").await? {
                match UploadedFile::from_path(&PathBuf::from(path.trim())) {
                    Ok(file) => {
                        if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                            draft.add_file(file);
                        }
                    }
                    Err(e) => println!("{} {}", "✗".red(), e),
                }
            }
        }
        Action::RemoveFile => {
            let labels: Vec<String> = workflow
                .state()
                .dataset_draft
                .files
                .iter()
                .enumerate()
                .map(|(i, file)| format!("{:>3}. {}", i + 1, file.display_name()))
                .collect();
            if let Some(choice) = select("Remove which file?", labels.clone()).await? {
                if let Some(index) = labels.iter().position(|l| *l == choice) {
                    if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                        draft.remove_file(index);
                    }
                }
            }
        }
        Action::LoadDocument => {
            if let Some(path) = text("Document path", "").await? {
                match std::fs::read_to_string(path.trim()) {
                    Ok(document) => {
                        if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                            draft.set_document(document);
                        }
                    }
                    Err(e) => println!("{} {}", "✗".red(), e),
                }
            }
        }
        Action::ClearDocument => {
            if let StageSlice::Data { draft, .. } = workflow.stage_props(Stage::Data).slice {
                draft.set_document("");
            }
        }
        Action::Preview => render::dataset_preview(&workflow.normalized_dataset()),
        Action::Caption => submit_and_wait(workflow, JobKind::Caption, WorkflowController::caption_document).await,
        Action::Ingest => {
            render::dataset_preview(&workflow.normalized_dataset());
            submit_and_wait(workflow, JobKind::Ingest, WorkflowController::ingest_dataset).await;
        }
        Action::EditSetting => {
            if let Some(field) = select("Which setting?", TrainField::ALL.to_vec()).await? {
                let current = workflow.state().train_form.get(field).to_string();
                if let Some(value) = text(field.label(), current).await? {
                    if let StageSlice::Settings { train_form, .. } = workflow.stage_props(Stage::Settings).slice {
                        train_form.set(field, value);
                    }
                }
            }
        }
        Action::CheckSettings => match workflow.state().train_form.validate() {
            Ok(config) => println!(
                "{} {} with {} on {} epoch(s)",
                "✓".green(),
                config.base_model,
                config.lora_type,
                config.num_epochs
            ),
            Err(e) => println!("{} {}", "✗".red(), e),
        },
        Action::Train => submit_and_wait(workflow, JobKind::Train, WorkflowController::start_training).await,
        Action::EditEvalModel => {
            let current = workflow.state().eval_form.base_model.clone();
            if let Some(value) = text("Base model", current).await? {
                if let StageSlice::Evaluation { eval_form, .. } = workflow.stage_props(Stage::Evaluation).slice {
                    eval_form.base_model = value;
                }
            }
        }
        Action::EditAdapter => {
            let current = workflow.state().eval_form.adapter_path.clone();
            if let Some(value) = text("Adapter path (blank uses the trained adapter)", current).await? {
                if let StageSlice::Evaluation { eval_form, .. } = workflow.stage_props(Stage::Evaluation).slice {
                    eval_form.adapter_path = value;
                }
            }
        }
        Action::EditPrompts => {
            if let Some(prompts) = read_prompts().await? {
                if let StageSlice::Evaluation { eval_form, .. } = workflow.stage_props(Stage::Evaluation).slice {
                    eval_form.prompts = prompts;
                }
            }
        }
        Action::Evaluate => submit_and_wait(workflow, JobKind::Evaluate, WorkflowController::run_evaluation).await,
        Action::ExportCard => submit_and_wait(workflow, JobKind::ExportCard, WorkflowController::export_card).await,
        Action::Wait | Action::Next | Action::Back(_) | Action::Quit => {}
    }
    Ok(())
}

async fn pick_row(workflow: &WorkflowController) -> Result<Option<usize>> {
    let labels: Vec<String> = workflow
        .state()
        .dataset_draft
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| format!("{:>3}. {}", i + 1, row.instruction))
        .collect();
    let Some(choice) = select("Which row?", labels.clone()).await? else {
        return Ok(None);
    };
    Ok(labels.iter().position(|l| *l == choice))
}

async fn edit_example(current: TrainingExample) -> Result<Option<TrainingExample>> {
    let Some(instruction) = text("Instruction", current.instruction).await? else {
        return Ok(None);
    };
    let Some(input) = text("Input (optional)", current.input).await? else {
        return Ok(None);
    };
    let Some(output) = text("Output", current.output).await? else {
        return Ok(None);
    };
    let tags: Vec<&str> = current.tags.iter().map(String::as_str).collect();
    let Some(tags) = text("Tags (separate with |)", tags.join("|")).await? else {
        return Ok(None);
    };

    let tags = tags.split('|').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
    Ok(Some(TrainingExample::new(instruction.trim(), output.trim()).with_input(input).with_tags(tags)))
}

/// Reads prompts one per line until an empty line.
async fn read_prompts() -> Result<Option<String>> {
    println!("  {}", "Enter one prompt per line; an empty line finishes.".dimmed());
    let mut prompts = Vec::new();
    loop {
        let Some(line) = text(format!("Prompt {}", prompts.len() + 1), "").await? else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            break;
        }
        prompts.push(line);
    }
    Ok(Some(prompts.join("\n")))
}

/// Submits through `submit` and waits for the result. Submission errors are
/// reported, never fatal.
async fn submit_and_wait<F>(workflow: &mut WorkflowController, kind: JobKind, submit: F)
where
    F: FnOnce(&mut WorkflowController) -> Result<Ticket, SubmitError>,
{
    match submit(workflow) {
        Ok(ticket) => {
            println!("  {} {} submitted ({})", "→".cyan(), kind, ticket);
            wait_for(workflow, kind).await;
        }
        Err(SubmitError::Busy(kind)) => {
            println!("{} {} is already running; wait for it to finish.", "!".yellow().bold(), kind);
        }
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

/// Waits for one job. Ctrl+C stops waiting; the job keeps running and its
/// result is shown once it arrives.
async fn wait_for(workflow: &mut WorkflowController, kind: JobKind) {
    println!("  {}", format!("Waiting for {kind}... (Ctrl+C to stop waiting)").dimmed());
    let waited = tokio::select! {
        resolution = workflow.await_job(kind) => Some(resolution),
        _ = tokio::signal::ctrl_c() => None,
    };
    match waited {
        Some(Some(resolution)) => render::resolution(&resolution, workflow.state()),
        Some(None) => {}
        None => println!("{}", "Stopped waiting; the result will appear when it arrives.".yellow()),
    }
}

async fn wait_any(workflow: &mut WorkflowController) {
    println!("  {}", "Waiting for running jobs... (Ctrl+C to stop waiting)".dimmed());
    let waited = tokio::select! {
        resolution = workflow.next_resolution() => Some(resolution),
        _ = tokio::signal::ctrl_c() => None,
    };
    match waited {
        Some(Some(resolution)) => render::resolution(&resolution, workflow.state()),
        Some(None) => {}
        None => println!("{}", "Stopped waiting.".yellow()),
    }
}
