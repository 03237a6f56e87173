//! `lorakit normalize`: offline dataset normalization preview.

use anyhow::{Context, Result};
use colored::Colorize;
use lorakit_dataset::formats::paragraph_examples;
use lorakit_dataset::{DatasetDraft, ExampleNormalizer, UploadedFile, to_jsonl, validate_examples};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn execute(files: &[PathBuf], document: Option<&Path>) -> Result<()> {
    let mut draft = DatasetDraft::default();
    for path in files {
        draft.add_file(UploadedFile::from_path(path)?);
    }
    if let Some(path) = document {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        draft.set_document(text);
    }

    let mut dataset = ExampleNormalizer::default().normalize(&draft);
    if let Some(ref text) = draft.document {
        dataset.splice_document(paragraph_examples(text));
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(to_jsonl(&dataset.examples)?.as_bytes())?;
    stdout.flush()?;

    for summary in &dataset.files {
        eprintln!(
            "{} {} ({}, {} rows)",
            "✓".green(),
            summary.file,
            summary.format.label().dimmed(),
            summary.rows
        );
    }
    if dataset.document_rows() > 0 {
        eprintln!(
            "{} document ({} local summary prompts; caption it in the console for generated Q&A)",
            "✓".green(),
            dataset.document_rows()
        );
    }
    for warning in &dataset.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }
    for issue in validate_examples(&dataset.examples) {
        eprintln!("{} {}", "note:".cyan(), issue);
    }
    eprintln!("{} examples", dataset.examples.len());

    Ok(())
}
