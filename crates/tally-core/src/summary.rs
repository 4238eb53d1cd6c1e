//! Aggregate metrics over the traces of one run: overall, per difficulty,
//! per question type, per transformation, and per judge.

use crate::adversarial::Transformation;
use crate::audit::TaskTrace;
use crate::calibration::stats;
use crate::judge::{JudgeKind, JudgeOutput, UNKNOWN_LABEL};
use crate::scorer::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic and numeric scores further apart than this count as a
/// disagreement between the judges.
pub const DISAGREEMENT_GAP: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub total_tasks: usize,
    pub avg_final_score: f64,
    pub std_final_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub avg_semantic_score: f64,
    pub avg_numeric_score: f64,
    pub contradiction_rate: f64,
    pub disagreement_rate: f64,
    pub error_counts: BTreeMap<ErrorKind, usize>,
    pub total_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub count: usize,
    pub avg_score: f64,
    pub std_score: f64,
    pub contradiction_rate: f64,
    pub disagreement_rate: f64,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeStats {
    pub calls: usize,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    /// Calls that did not return a usable verdict.
    pub errors: usize,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub overall: OverallMetrics,
    pub by_difficulty: BTreeMap<String, GroupMetrics>,
    pub by_question_type: BTreeMap<String, GroupMetrics>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_transformation: BTreeMap<Transformation, GroupMetrics>,
    pub judges: BTreeMap<JudgeKind, JudgeStats>,
}

fn disagrees(t: &TaskTrace) -> bool {
    (t.score.semantic_score - t.score.numeric_score).abs() > DISAGREEMENT_GAP
}

fn rate(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

impl OverallMetrics {
    fn compute(traces: &[TaskTrace]) -> Self {
        let n = traces.len();
        let finals: Vec<f64> = traces.iter().map(|t| t.score.final_score).collect();
        let semantic: Vec<f64> = traces.iter().map(|t| t.score.semantic_score).collect();
        let numeric: Vec<f64> = traces.iter().map(|t| t.score.numeric_score).collect();

        let mut error_counts = BTreeMap::new();
        for kind in traces.iter().flat_map(|t| t.score.error_taxonomy.iter()) {
            *error_counts.entry(*kind).or_insert(0) += 1;
        }
        let total_errors = error_counts.values().sum();

        Self {
            total_tasks: n,
            avg_final_score: stats::mean(&finals),
            std_final_score: stats::std_dev(&finals),
            min_score: stats::min(&finals),
            max_score: stats::max(&finals),
            avg_semantic_score: stats::mean(&semantic),
            avg_numeric_score: stats::mean(&numeric),
            contradiction_rate: rate(
                traces.iter().filter(|t| t.score.contradiction_violated).count(),
                n,
            ),
            disagreement_rate: rate(traces.iter().filter(|t| disagrees(t)).count(), n),
            error_counts,
            total_errors,
        }
    }
}

impl GroupMetrics {
    fn compute(traces: &[&TaskTrace]) -> Self {
        let n = traces.len();
        let finals: Vec<f64> = traces.iter().map(|t| t.score.final_score).collect();
        Self {
            count: n,
            avg_score: stats::mean(&finals),
            std_score: stats::std_dev(&finals),
            contradiction_rate: rate(
                traces.iter().filter(|t| t.score.contradiction_violated).count(),
                n,
            ),
            disagreement_rate: rate(traces.iter().filter(|t| disagrees(t)).count(), n),
            error_count: traces.iter().map(|t| t.score.error_taxonomy.len()).sum(),
        }
    }
}

fn group_by<K: Ord>(
    traces: &[TaskTrace],
    key: impl Fn(&TaskTrace) -> Option<K>,
) -> BTreeMap<K, GroupMetrics> {
    let mut groups: BTreeMap<K, Vec<&TaskTrace>> = BTreeMap::new();
    for t in traces {
        if let Some(k) = key(t) {
            groups.entry(k).or_default().push(t);
        }
    }
    groups
        .into_iter()
        .map(|(k, members)| (k, GroupMetrics::compute(&members)))
        .collect()
}

fn judge_output(t: &TaskTrace, kind: JudgeKind) -> &JudgeOutput {
    match kind {
        JudgeKind::Semantic => &t.semantic,
        JudgeKind::Numeric => &t.numeric,
        JudgeKind::Contradiction => &t.contradiction,
    }
}

fn judge_stats(traces: &[TaskTrace], kind: JudgeKind) -> JudgeStats {
    let outputs: Vec<&JudgeOutput> = traces.iter().map(|t| judge_output(t, kind)).collect();
    // missing latency counts as zero
    let latencies: Vec<f64> = outputs.iter().map(|o| o.latency_ms.unwrap_or(0.0)).collect();
    let errors = outputs.iter().filter(|o| !o.ok).count();
    JudgeStats {
        calls: outputs.len(),
        avg_latency_ms: stats::mean(&latencies),
        p95_latency_ms: stats::percentile(&latencies, 95.0),
        errors,
        error_rate: rate(errors, outputs.len()),
    }
}

impl TraceSummary {
    /// `None` for an empty run.
    pub fn compute(traces: &[TaskTrace]) -> Option<Self> {
        if traces.is_empty() {
            return None;
        }
        let label = |v: &Option<String>| {
            Some(v.clone().unwrap_or_else(|| UNKNOWN_LABEL.to_string()))
        };
        let summary = Self {
            overall: OverallMetrics::compute(traces),
            by_difficulty: group_by(traces, |t| label(&t.meta.difficulty_level)),
            by_question_type: group_by(traces, |t| label(&t.meta.question_type)),
            by_transformation: group_by(traces, |t| t.meta.transformation_type),
            judges: JudgeKind::ALL
                .into_iter()
                .map(|k| (k, judge_stats(traces, k)))
                .collect(),
        };
        tracing::debug!(
            tasks = summary.overall.total_tasks,
            avg = summary.overall.avg_final_score,
            "computed trace summary"
        );
        Some(summary)
    }
}
