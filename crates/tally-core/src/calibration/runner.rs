use super::folds::{KFold, Split};
use super::grid::{ParamGrid, ParamSet};
use super::model::{CalibrationResult, CvResult, CvStats, SplitMetrics};
use super::selection;
use crate::errors::CalibrationError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Scores one parameter combination on one train/test split.
///
/// An `Err` marks that cell as failed; the rest of the grid keeps running.
#[async_trait]
pub trait SplitEvaluator<T: Sync>: Send + Sync {
    async fn evaluate(
        &self,
        train: &[T],
        test: &[T],
        params: &ParamSet,
    ) -> anyhow::Result<SplitMetrics>;
}

/// Adapts a synchronous closure into a [`SplitEvaluator`].
pub struct FnEvaluator<F>(pub F);

#[async_trait]
impl<T, F> SplitEvaluator<T> for FnEvaluator<F>
where
    T: Sync,
    F: Fn(&[T], &[T], &ParamSet) -> anyhow::Result<SplitMetrics> + Send + Sync,
{
    async fn evaluate(
        &self,
        train: &[T],
        test: &[T],
        params: &ParamSet,
    ) -> anyhow::Result<SplitMetrics> {
        (self.0)(train, test, params)
    }
}

/// Grid search over repeated K-fold splits.
#[derive(Debug, Clone, Copy)]
pub struct Calibrator {
    cv: KFold,
    max_parallel: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(KFold::default(), 4)
    }
}

impl Calibrator {
    pub fn new(cv: KFold, max_parallel: usize) -> Self {
        Self {
            cv,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn kfold(&self) -> &KFold {
        &self.cv
    }

    /// Evaluates every (combination x split) cell, then aggregates, selects
    /// and runs the sensitivity analysis. Only a malformed design errors.
    pub async fn run<T, E>(
        &self,
        tasks: Vec<T>,
        grid: &ParamGrid,
        evaluator: Arc<E>,
    ) -> Result<CalibrationResult, CalibrationError>
    where
        T: Clone + Send + Sync + 'static,
        E: SplitEvaluator<T> + ?Sized + 'static,
    {
        grid.check_shape()?;
        let splits = Arc::new(self.cv.generate_splits(tasks.len())?);
        let combos = grid.combinations();
        let n_splits = splits.len();
        let n_cells = combos.len() * n_splits;

        tracing::info!(
            tasks = tasks.len(),
            combos = combos.len(),
            splits = n_splits,
            cells = n_cells,
            max_parallel = self.max_parallel,
            "calibration started"
        );

        let tasks = Arc::new(tasks);
        let sem = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set = JoinSet::new();

        'spawn: for (combo_idx, params) in combos.iter().enumerate() {
            for split_idx in 0..n_splits {
                let Ok(permit) = sem.clone().acquire_owned().await else {
                    break 'spawn;
                };
                let cell = combo_idx * n_splits + split_idx;
                let tasks = Arc::clone(&tasks);
                let splits = Arc::clone(&splits);
                let evaluator = Arc::clone(&evaluator);
                let params = params.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    let split = &splits[split_idx];
                    let train = select(&tasks, &split.train_indices);
                    let test = select(&tasks, &split.test_indices);
                    let outcome = evaluator.evaluate(&train, &test, &params).await;
                    (cell, outcome)
                });
            }
        }

        let mut outcomes: Vec<Option<Result<SplitMetrics, String>>> = vec![None; n_cells];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((cell, Ok(metrics))) if metrics.is_finite() => {
                    tracing::debug!(cell, score = metrics.score, "cell done");
                    outcomes[cell] = Some(Ok(metrics));
                }
                Ok((cell, Ok(metrics))) => {
                    outcomes[cell] = Some(Err(format!("non-finite metrics: {metrics:?}")));
                }
                Ok((cell, Err(e))) => {
                    outcomes[cell] = Some(Err(format!("{e:#}")));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "calibration cell task aborted");
                }
            }
        }

        let all_results: Vec<CvResult> = outcomes
            .into_iter()
            .enumerate()
            .map(|(cell, outcome)| {
                let params = &combos[cell / n_splits];
                let split = &splits[cell % n_splits];
                let outcome = outcome.unwrap_or_else(|| Err("evaluation did not complete".into()));
                to_cv_result(split, params, outcome)
            })
            .collect();

        let n_failed_cells = all_results.iter().filter(|r| r.is_failed()).count();
        let combo_stats = selection::aggregate(&combos, &all_results, n_splits);

        let best_idx = match selection::select_best(&combo_stats) {
            Some(i) => i,
            None => {
                tracing::warn!(
                    failed = n_failed_cells,
                    "every grid cell failed; falling back to the first combination"
                );
                0
            }
        };
        let best = &combo_stats[best_idx];
        let best_params = best.params.clone();
        let sensitivity_analysis =
            selection::sensitivity_analysis(grid, &combo_stats, &best_params);

        tracing::info!(
            best = %best_params,
            mean_score = best.mean_score,
            false_passes = best.mean_false_passes,
            false_fails = best.mean_false_fails,
            failed_cells = n_failed_cells,
            "calibration finished"
        );

        let cv_stats = CvStats {
            n_folds: self.cv.folds,
            n_repeats: self.cv.repeats,
            seed: self.cv.seed,
            n_param_combos: combos.len(),
            n_failed_cells,
            best_mean_score: best.mean_score,
            best_std_score: best.std_score,
            best_worst_score: best.worst_score,
            combos: combo_stats,
        };

        Ok(CalibrationResult {
            best_params,
            cv_stats,
            sensitivity_analysis,
            all_results,
        })
    }
}

fn select<T: Clone>(tasks: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| tasks[i].clone()).collect()
}

fn to_cv_result(split: &Split, params: &ParamSet, outcome: Result<SplitMetrics, String>) -> CvResult {
    let (metrics, error) = match outcome {
        Ok(m) => (Some(m), None),
        Err(e) => {
            tracing::warn!(
                repeat = split.repeat_idx,
                fold = split.fold_idx,
                params = %params,
                error = %e,
                "grid cell failed"
            );
            (None, Some(e))
        }
    };
    CvResult {
        repeat_idx: split.repeat_idx,
        fold_idx: split.fold_idx,
        train_indices: split.train_indices.clone(),
        test_indices: split.test_indices.clone(),
        params: params.clone(),
        metrics,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::Param;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_grid() -> ParamGrid {
        ParamGrid::new()
            .axis(Param::ConsistencyPenalty, vec![0.1, 0.2, 0.3])
            .axis(Param::HedgingPenalty, vec![0.0, 0.1])
    }

    /// Score peaks at consistency_penalty = 0.2; hedging barely matters.
    fn shaped(_train: &[u32], _test: &[u32], p: &ParamSet) -> anyhow::Result<SplitMetrics> {
        let cp = p.get(Param::ConsistencyPenalty).unwrap_or(0.0);
        let hp = p.get(Param::HedgingPenalty).unwrap_or(0.0);
        let score = 0.9 - (cp - 0.2).abs() * 2.0 - hp * 0.1;
        Ok(SplitMetrics {
            score,
            false_passes: if cp < 0.15 { 1.0 } else { 0.0 },
            false_fails: 0.0,
        })
    }

    #[tokio::test]
    async fn picks_lexicographic_best_and_flags_sensitivity() {
        let tasks: Vec<u32> = (0..20).collect();
        let cal = Calibrator::new(KFold::new(4, 2, 7), 3);
        let res = cal
            .run(tasks, &small_grid(), Arc::new(FnEvaluator(shaped)))
            .await
            .unwrap();

        assert_eq!(res.best_params.get(Param::ConsistencyPenalty), Some(0.2));
        assert_eq!(res.best_params.get(Param::HedgingPenalty), Some(0.0));
        assert_eq!(res.cv_stats.n_param_combos, 6);
        assert_eq!(res.all_results.len(), 6 * 8);
        assert_eq!(res.cv_stats.n_failed_cells, 0);
        assert!((res.cv_stats.best_mean_score - 0.9).abs() < 1e-9);
        assert!(res.cv_stats.best_std_score < 1e-12);

        // hp held at 0.0, cp over {0.1, 0.2, 0.3}: means {0.7, 0.9, 0.7}
        assert_eq!(res.critical_params(), vec![Param::ConsistencyPenalty]);
        let hp = &res.sensitivity_analysis[&Param::HedgingPenalty];
        assert!((hp.range - 0.01).abs() < 1e-9);
        assert!(!hp.critical);
    }

    #[tokio::test]
    async fn results_follow_grid_then_split_order() {
        let tasks: Vec<u32> = (0..10).collect();
        let cal = Calibrator::new(KFold::new(2, 2, 1), 8);
        let res = cal
            .run(tasks, &small_grid(), Arc::new(FnEvaluator(shaped)))
            .await
            .unwrap();
        let combos = small_grid().combinations();
        for (i, r) in res.all_results.iter().enumerate() {
            assert_eq!(r.params, combos[i / 4]);
            assert_eq!(r.repeat_idx, (i % 4) / 2);
            assert_eq!(r.fold_idx, i % 2);
        }
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_results() {
        let cal = Calibrator::new(KFold::new(3, 3, 42), 4);
        let a = cal
            .run((0..15u32).collect(), &small_grid(), Arc::new(FnEvaluator(shaped)))
            .await
            .unwrap();
        let b = cal
            .run((0..15u32).collect(), &small_grid(), Arc::new(FnEvaluator(shaped)))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn failing_cells_are_recorded_not_fatal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let eval = FnEvaluator(
            move |train: &[u32], test: &[u32], p: &ParamSet| -> anyhow::Result<SplitMetrics> {
                counter.fetch_add(1, Ordering::SeqCst);
                if p.get(Param::ConsistencyPenalty) == Some(0.2) {
                    anyhow::bail!("judge timeout");
                }
                shaped(train, test, p)
            },
        );
        let cal = Calibrator::new(KFold::new(2, 1, 3), 2);
        let res = cal
            .run((0..6u32).collect(), &small_grid(), Arc::new(eval))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 12);
        assert_eq!(res.cv_stats.n_failed_cells, 4);
        let failed: Vec<_> = res.all_results.iter().filter(|r| r.is_failed()).collect();
        assert!(failed.iter().all(|r| r.error.as_deref() == Some("judge timeout")));

        // cp=0.2 is unavailable, cp=0.1 carries false passes, so cp=0.3 wins.
        assert_eq!(res.best_params.get(Param::ConsistencyPenalty), Some(0.3));
        let dead = res
            .cv_stats
            .combos
            .iter()
            .find(|c| c.params.get(Param::ConsistencyPenalty) == Some(0.2))
            .unwrap();
        assert_eq!(dead.n_failed, dead.n_cells);
        assert!(!dead.is_eligible());
    }

    #[tokio::test]
    async fn non_finite_metrics_fail_the_cell() {
        let eval = FnEvaluator(|_: &[u32], _: &[u32], _: &ParamSet| -> anyhow::Result<SplitMetrics> {
            Ok(SplitMetrics {
                score: f64::NAN,
                false_passes: 0.0,
                false_fails: 0.0,
            })
        });
        let grid = ParamGrid::new().axis(Param::HedgingPenalty, vec![0.0, 0.1]);
        let res = Calibrator::new(KFold::new(2, 1, 0), 1)
            .run((0..4u32).collect(), &grid, Arc::new(eval))
            .await
            .unwrap();
        assert_eq!(res.cv_stats.n_failed_cells, 4);
        assert_eq!(res.best_params, grid.combinations()[0]);
    }

    #[tokio::test]
    async fn design_errors_surface_before_evaluation() {
        let cal = Calibrator::default();
        let err = cal
            .run((0..3u32).collect(), &small_grid(), Arc::new(FnEvaluator(shaped)))
            .await
            .unwrap_err();
        assert_eq!(err, CalibrationError::TooFewSamples { samples: 3, folds: 5 });

        let err = cal
            .run((0..30u32).collect(), &ParamGrid::new(), Arc::new(FnEvaluator(shaped)))
            .await
            .unwrap_err();
        assert_eq!(err, CalibrationError::EmptyGrid);
    }
}
