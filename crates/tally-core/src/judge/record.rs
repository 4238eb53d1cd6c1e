//! Recorded judgments: one JSON line per (task, evaluation).

use super::JudgeOutput;
use crate::adversarial::Transformation;
use crate::errors::RecordError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    #[default]
    Canonical,
    Adversarial,
}

impl FromStr for TaskSource {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canonical" => Ok(TaskSource::Canonical),
            "adversarial" => Ok(TaskSource::Adversarial),
            other => Err(RecordError::UnknownSource(other.to_string())),
        }
    }
}

/// Label attached to a reference task: should a correct scorer accept it?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Pass,
    Fail,
    /// The answer states conflicting values; the contradiction judge
    /// should fire and the answer must not pass.
    ContradictionViolated,
}

impl ExpectedOutcome {
    pub fn expects_pass(self) -> bool {
        matches!(self, ExpectedOutcome::Pass)
    }
}

/// Difficulty labels in report order; other labels sort after these.
pub const DIFFICULTY_LEVELS: [&str; 3] = ["Easy", "Medium", "Hard"];

/// Label for tasks that carry no value for a grouping key.
pub const UNKNOWN_LABEL: &str = "unknown";

pub fn difficulty_rank(label: &str) -> usize {
    DIFFICULTY_LEVELS
        .iter()
        .position(|d| *d == label)
        .unwrap_or(DIFFICULTY_LEVELS.len())
}

/// Where a task came from and how it was derived. Every field is optional;
/// summaries group by whatever is present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default, alias = "difficulty", skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_type: Option<Transformation>,
    #[serde(
        default,
        deserialize_with = "opt_task_id_from_any",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<String>,
}

fn id_from_value(v: serde_json::Value) -> Result<String, String> {
    match v {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("task id must be string or integer, got: {other}")),
    }
}

/// Task ids show up as integers in older logs and as strings in newer ones.
pub(crate) fn task_id_from_any<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    id_from_value(serde_json::Value::deserialize(d)?).map_err(serde::de::Error::custom)
}

fn opt_task_id_from_any<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(d)? {
        None => Ok(None),
        Some(v) => id_from_value(v).map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    #[serde(alias = "adversarial_id", deserialize_with = "task_id_from_any")]
    pub task_id: String,
    #[serde(default)]
    pub source: TaskSource,
    #[serde(default)]
    pub model_answer: String,
    #[serde(default)]
    pub gold_answer: String,
    pub semantic: JudgeOutput,
    pub numeric: JudgeOutput,
    pub contradiction: JudgeOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<ExpectedOutcome>,
    #[serde(flatten)]
    pub meta: TaskMeta,
}

/// Reads a JSONL file of [`JudgmentRecord`]s. Blank lines are skipped;
/// a malformed line fails the whole read with its 1-based line number.
pub fn read_records(path: &Path) -> Result<Vec<JudgmentRecord>, RecordError> {
    let records: Vec<JudgmentRecord> = read_jsonl(path)?;
    tracing::debug!(path = %path.display(), count = records.len(), "loaded judgment records");
    Ok(records)
}

pub(crate) fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RecordError> {
    let file = std::fs::File::open(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record =
            serde_json::from_str(&line).map_err(|source| RecordError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Groups repeated evaluations by task id, in order of first appearance.
pub fn group_by_task(records: &[JudgmentRecord]) -> Vec<(String, Vec<JudgmentRecord>)> {
    let mut groups: Vec<(String, Vec<JudgmentRecord>)> = Vec::new();
    for r in records {
        match groups.iter_mut().find(|(id, _)| *id == r.task_id) {
            Some((_, runs)) => runs.push(r.clone()),
            None => groups.push((r.task_id.clone(), vec![r.clone()])),
        }
    }
    groups
}
