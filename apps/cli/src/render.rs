//! Terminal rendering for console state and job results.

use chrono::Utc;
use colored::Colorize;
use lorakit_client::{
    CaptionResponse, EnvInfo, EvalResponse, IngestResponse, JobFailure, JobKind, ModelCard, TrainResponse,
};
use lorakit_core::{JobSlot, Resolution, SlotState, Stage, TrainField, TrainForm, WorkflowState};
use lorakit_dataset::{NormalizedDataset, TrainingExample, validate_examples};

/// Longest text shown in a single table cell.
const CELL_WIDTH: usize = 48;

pub fn stage_header(stage: Stage, furthest: Stage) {
    println!();
    let steps: Vec<String> = Stage::ALL
        .iter()
        .map(|s| {
            let label = format!("{}", s.number());
            if *s == stage {
                label.bold().cyan().to_string()
            } else if *s <= furthest {
                label.normal().to_string()
            } else {
                label.dimmed().to_string()
            }
        })
        .collect();
    println!("{}  {}", steps.join(" · "), stage.label().bold());
    println!("{}", "─".repeat(60).dimmed());
}

pub fn slot_line(slot: &JobSlot) {
    let status = match slot.state() {
        SlotState::Idle => return,
        SlotState::Pending { submitted_at, .. } => {
            let secs = (Utc::now() - *submitted_at).num_seconds().max(0);
            format!("running for {secs}s").yellow()
        }
        SlotState::Succeeded { finished_at, .. } => {
            format!("done at {}", finished_at.format("%H:%M:%S")).green()
        }
        SlotState::Failed { failure, .. } => format!("failed ({})", failure.kind).red(),
    };
    println!("  {:<18} {}", slot.kind().label().dimmed(), status);
}

pub fn job_failure(kind: JobKind, failure: &JobFailure) {
    println!("{} {} failed: {}", "✗".red().bold(), kind, failure.message);
    if let Some(hint) = failure.hint() {
        println!("  {} {}", "hint:".yellow(), hint);
    }
}

/// Reports a finished job, showing the merged result on success.
pub fn resolution(resolution: &Resolution, state: &WorkflowState) {
    if let Some(ref f) = resolution.failure {
        job_failure(resolution.kind, f);
        return;
    }
    println!("{} {} finished", "✓".green().bold(), resolution.kind);
    match resolution.kind {
        JobKind::EnvProbe => {
            if let Some(env) = &state.env_info {
                env_info(env);
            }
        }
        JobKind::Ingest => {
            if let Some(dataset) = &state.dataset {
                ingest(dataset);
            }
        }
        JobKind::Caption => {
            if let Some(caption) = &state.caption {
                caption_result(caption);
            }
        }
        JobKind::Train => {
            if let Some(result) = &state.last_train_result {
                train_result(result);
            }
        }
        JobKind::Evaluate => {
            if let Some(result) = &state.last_eval_result {
                eval_results(result);
            }
        }
        JobKind::ExportCard => {
            if let Some(card) = &state.model_card {
                model_card(card);
            }
        }
    }
}

pub fn env_info(env: &EnvInfo) {
    let yes_no = |flag: bool| if flag { "yes".green() } else { "no".red() };
    println!("  Platform:       {}", env.platform);
    println!("  CUDA:           {}", yes_no(env.cuda_available));
    println!("  bitsandbytes:   {}", yes_no(env.bitsandbytes_available));
    if let Some(ref torch) = env.torch_version {
        println!("  torch:          {torch}");
    }
    if env.gpus.is_empty() {
        if let Some(ref name) = env.gpu_name {
            println!("  GPU:            {name} (x{})", env.gpu_count.unwrap_or(1));
        } else {
            println!("  GPU:            {}", "none".dimmed());
        }
    }
    for gpu in &env.gpus {
        println!("  GPU:            {} ({:.1} GB)", gpu.name, gpu.vram_gb);
    }
    for (key, value) in &env.extra {
        println!("  {:<15} {}", format!("{key}:"), value);
    }
    println!(
        "  {} {}",
        "Recommended adapter:".cyan(),
        env.recommended_lora_type().to_string().bold()
    );
}

fn truncate(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= CELL_WIDTH {
        return flat;
    }
    let cut: String = flat.chars().take(CELL_WIDTH - 1).collect();
    format!("{cut}…")
}

pub fn examples(rows: &[TrainingExample]) {
    if rows.is_empty() {
        println!("  {}", "No rows yet.".dimmed());
        return;
    }
    for (i, row) in rows.iter().enumerate() {
        println!("  {:>3}  {}", i + 1, truncate(&row.instruction).bold());
        if !row.input.is_empty() {
            println!("       {} {}", "in:".dimmed(), truncate(&row.input));
        }
        println!("       {} {}", "out:".dimmed(), truncate(&row.output));
        if !row.tags.is_empty() {
            let tags: Vec<&str> = row.tags.iter().map(String::as_str).collect();
            println!("       {} {}", "tags:".dimmed(), tags.join(", ").dimmed());
        }
    }
}

pub fn dataset_preview(dataset: &NormalizedDataset) {
    for summary in &dataset.files {
        println!("  {} {} ({}, {} rows)", "✓".green(), summary.file, summary.format, summary.rows);
    }
    for warning in &dataset.warnings {
        println!("  {} {}", "warning:".yellow().bold(), warning);
    }
    if dataset.document_rows() > 0 {
        println!("  {} {} captioned rows", "✓".green(), dataset.document_rows());
    }
    for issue in validate_examples(&dataset.examples) {
        println!("  {} {}", "note:".cyan(), issue);
    }
    println!("  {} examples will be uploaded", dataset.examples.len().to_string().bold());
}

pub fn ingest(dataset: &IngestResponse) {
    println!("  Parsed {} examples", dataset.parsed_count.to_string().bold());
    for warning in &dataset.warnings {
        println!("  {} {}", "warning:".yellow().bold(), warning);
    }
}

pub fn caption_result(caption: &CaptionResponse) {
    println!("  Generated {} examples at {}", caption.examples_count.to_string().bold(), caption.path.cyan());
}

pub fn train_form(form: &TrainForm) {
    for field in TrainField::ALL {
        println!("  {:<18} {}", field.label().dimmed(), form.get(field));
    }
}

pub fn train_result(result: &TrainResponse) {
    println!("  Status:  {}", result.job_status.bold());
    if let Some(ref path) = result.adapter_path {
        println!("  Adapter: {}", path.cyan());
    }
    if let Some(ref metrics) = result.metrics {
        println!("  Metrics: {metrics}");
    }
}

pub fn eval_results(result: &EvalResponse) {
    if result.results.is_empty() {
        println!("  {}", "No results.".dimmed());
    }
    for item in &result.results {
        println!("  {} {}", "prompt:".dimmed(), item.prompt.bold());
        println!("  {}", item.completion);
        println!();
    }
}

pub fn model_card(card: &ModelCard) {
    println!("  Card: {}", card.card_path.cyan());
    match serde_json::to_string_pretty(&card.card_summary) {
        Ok(summary) if !card.card_summary.is_null() => {
            for line in summary.lines() {
                println!("  {line}");
            }
        }
        _ => {}
    }
}
