//! Repeated-run stability testing.
//!
//! Each task is evaluated `n_runs` times on identical input. A task is
//! stable when the population standard deviation of its scores is below
//! the threshold. Nothing here returns an error: instability shows up as
//! entries in [`StabilityReport::unstable_task_ids`].

use crate::calibration::{rescore, stats};
use crate::judge::JudgmentRecord;
use crate::scorer::ScorerConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_RUNS: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Produces one score per call. `run_idx` is the 0-based repeat number;
/// evaluators that hit a live judge can ignore it.
#[async_trait]
pub trait TaskEvaluator<T: Sync>: Send + Sync {
    async fn evaluate(&self, task: &T, run_idx: usize) -> f64;
}

/// Adapts a synchronous closure into a [`TaskEvaluator`].
pub struct FnTaskEvaluator<F>(pub F);

#[async_trait]
impl<T, F> TaskEvaluator<T> for FnTaskEvaluator<F>
where
    T: Sync,
    F: Fn(&T, usize) -> f64 + Send + Sync,
{
    async fn evaluate(&self, task: &T, run_idx: usize) -> f64 {
        (self.0)(task, run_idx)
    }
}

/// Replays the recorded evaluations of one task round-robin and rescores
/// each with the configured scorer.
#[derive(Debug, Clone, Default)]
pub struct RecordedRunsEvaluator {
    config: ScorerConfig,
}

impl RecordedRunsEvaluator {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TaskEvaluator<Vec<JudgmentRecord>> for RecordedRunsEvaluator {
    async fn evaluate(&self, runs: &Vec<JudgmentRecord>, run_idx: usize) -> f64 {
        if runs.is_empty() {
            return 0.0;
        }
        rescore(&runs[run_idx % runs.len()], &self.config).final_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityResult {
    pub task_id: String,
    pub n_runs: usize,
    /// Scores in run order.
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub is_stable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub per_task_results: Vec<StabilityResult>,
    /// Fraction of stable tasks; 0 when no tasks were tested.
    pub overall_stability: f64,
    pub avg_std: f64,
    pub max_std: f64,
    pub unstable_task_ids: Vec<String>,
}

impl StabilityReport {
    pub fn is_fully_stable(&self) -> bool {
        self.unstable_task_ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityTester {
    n_runs: usize,
    threshold: f64,
    max_parallel: usize,
}

impl Default for StabilityTester {
    fn default() -> Self {
        Self::new(DEFAULT_RUNS, DEFAULT_THRESHOLD)
    }
}

impl StabilityTester {
    pub fn new(n_runs: usize, threshold: f64) -> Self {
        Self {
            n_runs: n_runs.max(1),
            threshold,
            max_parallel: 4,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn n_runs(&self) -> usize {
        self.n_runs
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluates every `(task_id, task)` pair `n_runs` times. Runs of
    /// different tasks, and of the same task, may overlap up to
    /// `max_parallel`. A run whose task aborts is dropped from that task's
    /// scores with a warning.
    pub async fn test<T, E>(&self, tasks: Vec<(String, T)>, evaluator: Arc<E>) -> StabilityReport
    where
        T: Send + Sync + 'static,
        E: TaskEvaluator<T> + ?Sized + 'static,
    {
        tracing::info!(
            tasks = tasks.len(),
            runs = self.n_runs,
            threshold = self.threshold,
            "stability run started"
        );

        let (ids, inputs): (Vec<String>, Vec<T>) = tasks.into_iter().unzip();
        let inputs: Vec<Arc<T>> = inputs.into_iter().map(Arc::new).collect();
        let sem = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set = JoinSet::new();

        'spawn: for (task_idx, input) in inputs.iter().enumerate() {
            for run_idx in 0..self.n_runs {
                let Ok(permit) = sem.clone().acquire_owned().await else {
                    break 'spawn;
                };
                let input = Arc::clone(input);
                let evaluator = Arc::clone(&evaluator);
                join_set.spawn(async move {
                    let _permit = permit;
                    let score = evaluator.evaluate(&input, run_idx).await;
                    (task_idx, run_idx, score)
                });
            }
        }

        let mut slots: Vec<Vec<Option<f64>>> = vec![vec![None; self.n_runs]; ids.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((task_idx, run_idx, score)) => slots[task_idx][run_idx] = Some(score),
                Err(e) => tracing::warn!(error = %e, "stability run aborted"),
            }
        }

        let per_task_results: Vec<StabilityResult> = ids
            .into_iter()
            .zip(slots)
            .map(|(task_id, runs)| self.summarize(task_id, runs))
            .collect();
        let report = self.aggregate(per_task_results);

        tracing::info!(
            overall = report.overall_stability,
            avg_std = report.avg_std,
            max_std = report.max_std,
            unstable = report.unstable_task_ids.len(),
            "stability run finished"
        );
        report
    }

    fn summarize(&self, task_id: String, runs: Vec<Option<f64>>) -> StabilityResult {
        let missing = runs.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            tracing::warn!(task_id = %task_id, missing, "some runs did not complete");
        }
        let scores: Vec<f64> = runs.into_iter().flatten().collect();
        let std = stats::std_dev(&scores);
        let result = StabilityResult {
            n_runs: self.n_runs,
            mean: stats::mean(&scores),
            std,
            min: stats::min(&scores),
            max: stats::max(&scores),
            // NaN std is never stable
            is_stable: !scores.is_empty() && std < self.threshold,
            scores,
            task_id,
        };
        tracing::debug!(task_id = %result.task_id, std = result.std, stable = result.is_stable, "task measured");
        result
    }

    fn aggregate(&self, per_task_results: Vec<StabilityResult>) -> StabilityReport {
        let stds: Vec<f64> = per_task_results.iter().map(|r| r.std).collect();
        let stable = per_task_results.iter().filter(|r| r.is_stable).count();
        let unstable_task_ids = per_task_results
            .iter()
            .filter(|r| !r.is_stable)
            .map(|r| r.task_id.clone())
            .collect();
        let overall_stability = if per_task_results.is_empty() {
            0.0
        } else {
            stable as f64 / per_task_results.len() as f64
        };
        StabilityReport {
            overall_stability,
            avg_std: stats::mean(&stds),
            max_std: stats::max(&stds),
            unstable_task_ids,
            per_task_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{JudgeKind, JudgeOutput, TaskMeta, TaskSource};

    fn ids(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("task-{i}"), i)).collect()
    }

    #[tokio::test]
    async fn constant_scores_are_stable() {
        let report = StabilityTester::default()
            .test(ids(3), Arc::new(FnTaskEvaluator(|_: &usize, _: usize| 1.0)))
            .await;
        assert_eq!(report.per_task_results.len(), 3);
        for r in &report.per_task_results {
            assert_eq!(r.scores, vec![1.0; 5]);
            assert_eq!(r.std, 0.0);
            assert!(r.is_stable);
        }
        assert_eq!(report.overall_stability, 1.0);
        assert!(report.is_fully_stable());
    }

    #[tokio::test]
    async fn alternating_scores_are_unstable() {
        let report = StabilityTester::default()
            .test(
                ids(1),
                Arc::new(FnTaskEvaluator(|_: &usize, run: usize| (run % 2) as f64)),
            )
            .await;
        let r = &report.per_task_results[0];
        assert_eq!(r.scores, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        // population std of {0,1,0,1,0} is sqrt(0.24), about 0.49
        assert!((r.std - 0.24f64.sqrt()).abs() < 1e-12);
        assert!((r.std - 0.5).abs() < 0.02);
        assert!(!r.is_stable);
        assert_eq!(report.unstable_task_ids, vec!["task-0".to_string()]);
        assert_eq!(report.overall_stability, 0.0);
    }

    #[tokio::test]
    async fn mixed_tasks_aggregate() {
        let eval = FnTaskEvaluator(|task: &usize, run: usize| {
            if *task == 1 {
                (run % 2) as f64
            } else {
                0.8
            }
        });
        let report = StabilityTester::new(4, 0.05)
            .with_max_parallel(2)
            .test(ids(4), Arc::new(eval))
            .await;
        assert_eq!(report.overall_stability, 0.75);
        assert_eq!(report.unstable_task_ids, vec!["task-1".to_string()]);
        assert!((report.max_std - 0.5).abs() < 1e-12);
        assert!((report.avg_std - 0.125).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_input_reports_zero() {
        let report = StabilityTester::default()
            .test(Vec::<(String, usize)>::new(), Arc::new(FnTaskEvaluator(|_: &usize, _: usize| 1.0)))
            .await;
        assert!(report.per_task_results.is_empty());
        assert_eq!(report.overall_stability, 0.0);
        assert_eq!(report.max_std, 0.0);
    }

    fn run(semantic: f64) -> JudgmentRecord {
        JudgmentRecord {
            task_id: "q1".into(),
            source: TaskSource::Canonical,
            model_answer: "42".into(),
            gold_answer: "42".into(),
            semantic: JudgeOutput::success(JudgeKind::Semantic, semantic, 0.9),
            numeric: JudgeOutput::failed(JudgeKind::Numeric, "timeout"),
            contradiction: JudgeOutput::success(JudgeKind::Contradiction, 0.0, 0.9)
                .with_violated(false),
            expected_outcome: None,
            meta: TaskMeta::default(),
        }
    }

    #[tokio::test]
    async fn recorded_runs_replay_round_robin() {
        let tasks = vec![("q1".to_string(), vec![run(0.9), run(0.3)])];
        let report = StabilityTester::new(4, 0.05)
            .test(tasks, Arc::new(RecordedRunsEvaluator::default()))
            .await;
        let r = &report.per_task_results[0];
        assert_eq!(r.scores, vec![0.9, 0.3, 0.9, 0.3]);
        assert!((r.std - 0.3).abs() < 1e-12);
        assert!(!r.is_stable);
    }
}
