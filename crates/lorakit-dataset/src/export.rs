use crate::error::DatasetResult;
use crate::example::TrainingExample;
use serde::{Deserialize, Serialize};

/// Serializes examples as canonical JSONL, one example per line.
pub fn to_jsonl(examples: &[TrainingExample]) -> DatasetResult<String> {
    let mut out = String::new();
    for ex in examples {
        out.push_str(&serde_json::to_string(ex)?);
        out.push('\n');
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyInstruction,
    EmptyOutput,
}

/// An advisory note about one example. Issues never block ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleIssue {
    pub index: usize,
    pub kind: IssueKind,
}

impl std::fmt::Display for ExampleIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            IssueKind::EmptyInstruction => write!(f, "[{}] instruction is empty", self.index),
            IssueKind::EmptyOutput => write!(
                f,
                "[{}] output is empty (fill it in or let the backend generate one before training)",
                self.index
            ),
        }
    }
}

pub fn validate_examples(examples: &[TrainingExample]) -> Vec<ExampleIssue> {
    let mut issues = Vec::new();
    for (index, ex) in examples.iter().enumerate() {
        if ex.instruction.trim().is_empty() {
            issues.push(ExampleIssue { index, kind: IssueKind::EmptyInstruction });
        }
        if ex.output.trim().is_empty() {
            issues.push(ExampleIssue { index, kind: IssueKind::EmptyOutput });
        }
    }
    issues
}
