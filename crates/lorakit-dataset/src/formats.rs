//! File format detection and per-format parsers.
//!
//! Uploaded files carry no declared format. The content is sniffed (JSON
//! records, conversation transcripts, delimited tables, markdown headings)
//! and falls back to plain text. Anything that is not UTF-8 text, or is
//! empty, is rejected as undetectable.

use crate::error::{DatasetError, DatasetResult};
use crate::example::{TrainingExample, UploadedFile};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Instruction used for paragraphs that arrive without a question.
pub const SUMMARY_INSTRUCTION: &str = "Summarize the following text.";

const INSTRUCTION_KEYS: &[&str] = &["instruction", "question", "prompt"];
const INPUT_KEYS: &[&str] = &["input", "context"];
const OUTPUT_KEYS: &[&str] = &["output", "answer", "response"];
const TAG_KEYS: &[&str] = &["tags"];

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph regex is valid"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*#*\s*$").expect("heading regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Delimited table with a header row.
    Csv,
    /// Line-delimited JSON records (or a JSON array of records).
    Jsonl,
    /// Multi-turn transcripts (`conversations` / `messages`).
    Conversation,
    /// Heading-structured markup.
    Markdown,
    PlainText,
}

impl FileFormat {
    pub fn label(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
            Self::Conversation => "conversation",
            Self::Markdown => "markdown",
            Self::PlainText => "text",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub format: FileFormat,
    pub examples: Vec<TrainingExample>,
}

/// Detects the format of `file` and converts its rows into examples.
///
/// Blank examples are not filtered here; that is the normalizer's job.
pub fn parse_file(file: &UploadedFile) -> DatasetResult<ParsedFile> {
    let text = decode_text(&file.bytes)?;
    let ext = file.extension();
    let format = detect_format(ext.as_deref(), &text)?;

    let examples = match format {
        FileFormat::Csv => parse_table(&text, ext.as_deref())?,
        FileFormat::Jsonl => json_records(&text)?
            .iter()
            .enumerate()
            .map(|(idx, record)| record_example(idx, record))
            .collect::<DatasetResult<Vec<_>>>()?,
        FileFormat::Conversation => parse_transcripts(&json_records(&text)?)?,
        FileFormat::Markdown => parse_markdown(&text),
        FileFormat::PlainText => paragraph_examples(&text),
    };

    Ok(ParsedFile { format, examples })
}

/// Decodes file bytes as UTF-8 text with normalized line endings.
pub fn decode_text(bytes: &[u8]) -> DatasetResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DatasetError::Undetected("content is not UTF-8 text".to_string()))?;
    if text.contains('\0') {
        return Err(DatasetError::Undetected("binary content".to_string()));
    }
    if text.trim().is_empty() {
        return Err(DatasetError::Undetected("file is empty".to_string()));
    }
    Ok(text.replace("\r\n", "\n"))
}

/// Sniffs the format of decoded text. `ext` is the lowercased file extension.
pub fn detect_format(ext: Option<&str>, text: &str) -> DatasetResult<FileFormat> {
    let declared_json = matches!(ext, Some("json" | "jsonl" | "ndjson"));
    let trimmed = text.trim_start();

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match json_records(text) {
            Ok(records) => {
                let format = if records.iter().any(is_transcript) {
                    FileFormat::Conversation
                } else {
                    FileFormat::Jsonl
                };
                return Ok(format);
            }
            Err(e) if declared_json => return Err(e),
            Err(_) => {}
        }
    } else if declared_json {
        return Err(DatasetError::parse("jsonl", "expected JSON objects"));
    }

    if matches!(ext, Some("csv" | "tsv")) || looks_like_table(text) {
        return Ok(FileFormat::Csv);
    }
    if matches!(ext, Some("md" | "markdown")) || text.lines().any(|l| HEADING.is_match(l)) {
        return Ok(FileFormat::Markdown);
    }
    Ok(FileFormat::PlainText)
}

/// Splits text into blank-line separated paragraphs and turns each into a
/// summary prompt with an empty output.
pub fn paragraph_examples(text: &str) -> Vec<TrainingExample> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            TrainingExample::new(SUMMARY_INSTRUCTION, "")
                .with_input(chunk)
                .with_tags(["summary", "auto"])
        })
        .collect()
}

fn json_records(text: &str) -> DatasetResult<Vec<Map<String, Value>>> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return match value {
            Value::Object(record) => Ok(vec![record]),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(DatasetError::parse("jsonl", format!("element {} is not an object", idx + 1))),
                })
                .collect(),
            _ => Err(DatasetError::parse("jsonl", "top-level value is not an object or array")),
        };
    }

    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => records.push(record),
            Ok(_) => return Err(DatasetError::parse("jsonl", format!("line {} is not an object", idx + 1))),
            Err(e) => return Err(DatasetError::parse("jsonl", format!("line {}: {}", idx + 1, e))),
        }
    }
    Ok(records)
}

fn is_transcript(record: &Map<String, Value>) -> bool {
    record
        .get("conversations")
        .or_else(|| record.get("messages"))
        .is_some_and(Value::is_array)
}

fn looks_like_table(text: &str) -> bool {
    let Some(header) = text.lines().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    let delimiter = if header.contains('\t') { '\t' } else { ',' };
    let columns: Vec<String> = header
        .split(delimiter)
        .map(|c| c.trim().trim_matches('"').to_lowercase())
        .collect();
    columns.len() >= 2
        && columns
            .iter()
            .any(|c| INSTRUCTION_KEYS.contains(&c.as_str()) || OUTPUT_KEYS.contains(&c.as_str()))
}

fn parse_table(text: &str, ext: Option<&str>) -> DatasetResult<Vec<TrainingExample>> {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let delimiter = if ext == Some("tsv") || header.contains('\t') { b'\t' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_lowercase).collect();
    let column = |keys: &[&str]| headers.iter().position(|h| keys.contains(&h.as_str()));
    let instruction = column(INSTRUCTION_KEYS);
    let input = column(INPUT_KEYS);
    let output = column(OUTPUT_KEYS);
    let tags = column(TAG_KEYS);

    if instruction.is_none() && output.is_none() {
        return Err(DatasetError::parse("csv", "table has no instruction or output column"));
    }

    let mut examples = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or_default();
        examples.push(TrainingExample {
            instruction: cell(instruction).trim().to_string(),
            input: cell(input).to_string(),
            output: cell(output).trim().to_string(),
            tags: split_tags(cell(tags)),
        });
    }
    Ok(examples)
}

fn record_example(index: usize, record: &Map<String, Value>) -> DatasetResult<TrainingExample> {
    let instruction = field(record, INSTRUCTION_KEYS);
    let output = field(record, OUTPUT_KEYS);
    if instruction.is_none() && output.is_none() {
        return Err(DatasetError::parse(
            "jsonl",
            format!("record {} has no instruction or output field", index + 1),
        ));
    }

    Ok(TrainingExample {
        instruction: instruction.unwrap_or_default().trim().to_string(),
        input: field(record, INPUT_KEYS).unwrap_or_default(),
        output: output.unwrap_or_default().trim().to_string(),
        tags: record.get("tags").map(tags_from_value).unwrap_or_default(),
    })
}

#[derive(Clone, Copy)]
enum Role {
    System,
    User,
    Assistant,
}

fn role_of(turn: &Map<String, Value>) -> Option<Role> {
    let role = turn
        .get("from")
        .or_else(|| turn.get("role"))
        .and_then(Value::as_str)?
        .to_lowercase();
    match role.as_str() {
        "system" => Some(Role::System),
        "human" | "user" => Some(Role::User),
        "gpt" | "assistant" | "bot" | "model" | "chatgpt" => Some(Role::Assistant),
        _ => None,
    }
}

fn parse_transcripts(records: &[Map<String, Value>]) -> DatasetResult<Vec<TrainingExample>> {
    let mut examples = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let turns = record
            .get("conversations")
            .or_else(|| record.get("messages"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DatasetError::parse(
                    "conversation",
                    format!("record {} has no conversations or messages list", idx + 1),
                )
            })?;

        let mut system = String::new();
        let mut pending: Option<String> = None;

        for turn in turns.iter().filter_map(Value::as_object) {
            let content = turn
                .get("value")
                .or_else(|| turn.get("content"))
                .map(value_text)
                .unwrap_or_default();
            match role_of(turn) {
                Some(Role::System) => system = content,
                Some(Role::User) => {
                    // A user turn without a reply still becomes an example.
                    if let Some(question) = pending.replace(content) {
                        examples.push(exchange(&question, &system, ""));
                    }
                }
                Some(Role::Assistant) => {
                    if let Some(question) = pending.take() {
                        examples.push(exchange(&question, &system, &content));
                    }
                }
                None => {}
            }
        }

        if let Some(question) = pending {
            examples.push(exchange(&question, &system, ""));
        }
    }

    Ok(examples)
}

fn exchange(question: &str, system: &str, answer: &str) -> TrainingExample {
    TrainingExample::new(question.trim(), answer.trim())
        .with_input(system)
        .with_tags(["conversation"])
}

fn parse_markdown(text: &str) -> Vec<TrainingExample> {
    let mut preface = String::new();
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let heading = if in_fence { None } else { HEADING.captures(line) };

        if let Some(caps) = heading {
            sections.push((caps[1].trim().to_string(), String::new()));
        } else {
            let target = match sections.last_mut() {
                Some((_, body)) => body,
                None => &mut preface,
            };
            target.push_str(line);
            target.push('\n');
        }
    }

    let mut examples = paragraph_examples(&preface);
    examples.extend(sections.into_iter().filter_map(|(heading, body)| {
        let body = body.trim();
        (!body.is_empty()).then(|| TrainingExample::new(heading, body).with_tags(["markdown"]))
    }));
    examples
}

fn field(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| record.get(*key)).map(value_text)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn split_tags(raw: &str) -> BTreeSet<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn tags_from_value(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Value::String(s) => split_tags(s),
        _ => BTreeSet::new(),
    }
}
