//! Append-only audit log for one run.
//!
//! Layout under `<logs_dir>/<run_id>/`:
//!
//! ```text
//! canonical_traces.jsonl     one TaskTrace per line
//! adversarial_traces.jsonl   one TaskTrace per line
//! manifest.json              RunManifest
//! ```
//!
//! Every append holds the log's mutex for the whole line write, so
//! concurrent scorers never interleave partial JSON.

use crate::errors::AuditError;
use crate::judge::{ExpectedOutcome, JudgeOutput, JudgmentRecord, TaskMeta, TaskSource};
use crate::manifest::RunManifest;
use crate::scorer::HybridScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CANONICAL_TRACES: &str = "canonical_traces.jsonl";
pub const ADVERSARIAL_TRACES: &str = "adversarial_traces.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Everything needed to reconstruct one scored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTrace {
    pub task_id: String,
    pub source: TaskSource,
    pub timestamp: DateTime<Utc>,
    pub model_answer: String,
    pub gold_answer: String,
    pub semantic: JudgeOutput,
    pub numeric: JudgeOutput,
    pub contradiction: JudgeOutput,
    pub score: HybridScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<ExpectedOutcome>,
    #[serde(flatten)]
    pub meta: TaskMeta,
}

impl TaskTrace {
    pub fn from_record(record: &JudgmentRecord, score: HybridScore) -> Self {
        Self {
            task_id: record.task_id.clone(),
            source: record.source,
            timestamp: Utc::now(),
            model_answer: record.model_answer.clone(),
            gold_answer: record.gold_answer.clone(),
            semantic: record.semantic.clone(),
            numeric: record.numeric.clone(),
            contradiction: record.contradiction.clone(),
            score,
            expected_outcome: record.expected_outcome,
            meta: record.meta.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    canonical: usize,
    adversarial: usize,
    errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub run_id: String,
    pub canonical_traces: usize,
    pub adversarial_traces: usize,
    /// Error-taxonomy entries across all logged traces.
    pub total_errors: usize,
    pub logs_dir: PathBuf,
}

#[derive(Debug)]
pub struct AuditLog {
    run_id: String,
    run_dir: PathBuf,
    counters: Mutex<Counters>,
}

impl AuditLog {
    /// Creates `<logs_dir>/<run_id>/` if needed.
    pub fn create(logs_dir: &Path, run_id: impl Into<String>) -> Result<Self, AuditError> {
        let run_id = run_id.into();
        let run_dir = logs_dir.join(&run_id);
        std::fs::create_dir_all(&run_dir).map_err(|e| AuditError::io(&run_dir, e))?;
        tracing::info!(run_id = %run_id, dir = %run_dir.display(), "audit log opened");
        Ok(Self {
            run_id,
            run_dir,
            counters: Mutex::new(Counters::default()),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn traces_path(&self, source: TaskSource) -> PathBuf {
        trace_file(&self.run_dir, source)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.run_dir.join(MANIFEST_FILE)
    }

    pub fn log_trace(&self, trace: &TaskTrace) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(trace)?;
        line.push('\n');
        let path = self.traces_path(trace.source);

        let mut counters = self.counters.lock().map_err(|_| AuditError::Poisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| AuditError::io(&path, e))?;

        match trace.source {
            TaskSource::Canonical => counters.canonical += 1,
            TaskSource::Adversarial => counters.adversarial += 1,
        }
        counters.errors += trace.score.error_taxonomy.len();
        Ok(())
    }

    pub fn log_manifest(&self, manifest: &RunManifest) -> Result<(), AuditError> {
        manifest.write(&self.manifest_path())
    }

    pub fn stats(&self) -> Result<AuditStats, AuditError> {
        let c = self.counters.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(AuditStats {
            run_id: self.run_id.clone(),
            canonical_traces: c.canonical,
            adversarial_traces: c.adversarial,
            total_errors: c.errors,
            logs_dir: self.run_dir.clone(),
        })
    }

    /// Reads back one trace file of this run. See [`read_trace_file`].
    pub fn read_traces(&self, source: TaskSource) -> Result<Vec<TaskTrace>, AuditError> {
        read_trace_file(&self.traces_path(source))
    }

    pub fn read_manifest(&self) -> Result<Option<RunManifest>, AuditError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        RunManifest::read(&path).map(Some)
    }
}

/// Trace file for `source` inside a run directory.
pub fn trace_file(run_dir: &Path, source: TaskSource) -> PathBuf {
    match source {
        TaskSource::Canonical => run_dir.join(CANONICAL_TRACES),
        TaskSource::Adversarial => run_dir.join(ADVERSARIAL_TRACES),
    }
}

/// Reads a trace file. A missing file is empty; malformed lines are
/// skipped with a warning.
pub fn read_trace_file(path: &Path) -> Result<Vec<TaskTrace>, AuditError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path).map_err(|e| AuditError::io(path, e))?;
    let mut traces = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AuditError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskTrace>(&line) {
            Ok(t) => traces.push(t),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = i + 1,
                error = %e,
                "skipping malformed trace"
            ),
        }
    }
    Ok(traces)
}

/// Run ids with a directory under `logs_dir`, sorted.
pub fn list_runs(logs_dir: &Path) -> Result<Vec<String>, AuditError> {
    if !logs_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(logs_dir).map_err(|e| AuditError::io(logs_dir, e))?;
    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AuditError::io(logs_dir, e))?;
        if entry.path().is_dir() {
            runs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    runs.sort();
    Ok(runs)
}
