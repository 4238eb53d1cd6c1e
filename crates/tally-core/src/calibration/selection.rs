//! Aggregation, lexicographic selection and sensitivity analysis over
//! finished grid cells.

use super::grid::{ParamGrid, ParamSet};
use super::model::{ComboStats, CvResult, Sensitivity, ValueMean, CRITICAL_RANGE};
use super::stats;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-combination statistics. `results` must be combination-major with
/// `n_splits` cells per combination, in the same order as `combos`.
pub fn aggregate(combos: &[ParamSet], results: &[CvResult], n_splits: usize) -> Vec<ComboStats> {
    combos
        .iter()
        .zip(results.chunks(n_splits.max(1)))
        .map(|(params, cells)| {
            let ok: Vec<_> = cells.iter().filter_map(|c| c.metrics).collect();
            let scores: Vec<f64> = ok.iter().map(|m| m.score).collect();
            let fps: Vec<f64> = ok.iter().map(|m| m.false_passes).collect();
            let ffs: Vec<f64> = ok.iter().map(|m| m.false_fails).collect();
            ComboStats {
                params: params.clone(),
                n_cells: cells.len(),
                n_failed: cells.len() - ok.len(),
                mean_score: stats::mean(&scores),
                std_score: stats::std_dev(&scores),
                worst_score: stats::min(&scores),
                mean_false_passes: stats::mean(&fps),
                mean_false_fails: stats::mean(&ffs),
            }
        })
        .collect()
}

/// Index of the best eligible combination; ties keep the earliest one.
pub fn select_best(combos: &[ComboStats]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in combos.iter().enumerate() {
        if !c.is_eligible() {
            continue;
        }
        match best {
            Some(b) if c.objective_cmp(&combos[b]) != Ordering::Less => {}
            _ => best = Some(i),
        }
    }
    best
}

/// For each grid axis, hold every other parameter at its best value and
/// measure how far the mean score moves across this axis' values.
pub fn sensitivity_analysis(
    grid: &ParamGrid,
    combos: &[ComboStats],
    best: &ParamSet,
) -> BTreeMap<crate::scorer::Param, Sensitivity> {
    let mut out = BTreeMap::new();
    for param in grid.params() {
        let by_value: Vec<ValueMean> = grid
            .values(param)
            .iter()
            .filter_map(|&value| {
                combos
                    .iter()
                    .find(|c| {
                        c.is_eligible()
                            && c.params.get(param) == Some(value)
                            && c.params.matches_except(best, param)
                    })
                    .map(|c| ValueMean {
                        value,
                        mean_score: c.mean_score,
                    })
            })
            .collect();

        let means: Vec<f64> = by_value.iter().map(|v| v.mean_score).collect();
        let range = if means.is_empty() {
            0.0
        } else {
            stats::max(&means) - stats::min(&means)
        };
        out.insert(
            param,
            Sensitivity {
                range,
                by_value,
                critical: range > CRITICAL_RANGE,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::model::SplitMetrics;
    use crate::scorer::Param;

    fn stats_with(fp: f64, ff: f64, score: f64) -> ComboStats {
        ComboStats {
            params: ParamSet::default(),
            n_cells: 1,
            n_failed: 0,
            mean_score: score,
            std_score: 0.0,
            worst_score: score,
            mean_false_passes: fp,
            mean_false_fails: ff,
        }
    }

    #[test]
    fn false_passes_dominate_score() {
        let a = stats_with(0.0, 2.0, 0.70);
        let b = stats_with(1.0, 0.0, 0.90);
        assert_eq!(select_best(&[b.clone(), a.clone()]), Some(1));
        assert_eq!(select_best(&[a, b]), Some(0));
    }

    #[test]
    fn false_fails_then_score_break_ties() {
        let a = stats_with(0.0, 1.0, 0.95);
        let b = stats_with(0.0, 0.0, 0.60);
        assert_eq!(select_best(&[a, b]), Some(1));

        let c = stats_with(0.0, 0.0, 0.60);
        let d = stats_with(0.0, 0.0, 0.61);
        assert_eq!(select_best(&[c, d]), Some(1));
    }

    #[test]
    fn exact_ties_keep_first() {
        let a = stats_with(0.5, 0.5, 0.5);
        assert_eq!(select_best(&[a.clone(), a.clone(), a]), Some(0));
    }

    #[test]
    fn ineligible_combos_are_skipped() {
        let mut dead = stats_with(0.0, 0.0, 0.0);
        dead.n_failed = 1;
        let alive = stats_with(3.0, 3.0, 0.1);
        assert_eq!(select_best(&[dead.clone(), alive]), Some(1));
        assert_eq!(select_best(&[dead]), None);
    }

    #[test]
    fn aggregate_ignores_failed_cells() {
        let params = ParamSet::default().with(Param::HedgingPenalty, 0.1);
        let cell = |metrics: Option<SplitMetrics>| CvResult {
            repeat_idx: 0,
            fold_idx: 0,
            train_indices: vec![],
            test_indices: vec![],
            params: params.clone(),
            error: metrics.is_none().then(|| "boom".to_string()),
            metrics,
        };
        let results = vec![
            cell(Some(SplitMetrics { score: 0.4, false_passes: 1.0, false_fails: 0.0 })),
            cell(None),
            cell(Some(SplitMetrics { score: 0.8, false_passes: 0.0, false_fails: 2.0 })),
        ];
        let combos = aggregate(&[params], &results, 3);
        assert_eq!(combos.len(), 1);
        let c = &combos[0];
        assert_eq!(c.n_cells, 3);
        assert_eq!(c.n_failed, 1);
        assert!((c.mean_score - 0.6).abs() < 1e-12);
        assert!((c.std_score - 0.2).abs() < 1e-12);
        assert_eq!(c.worst_score, 0.4);
        assert_eq!(c.mean_false_passes, 0.5);
        assert_eq!(c.mean_false_fails, 1.0);
    }

    fn combo(cp: f64, hp: f64, score: f64) -> ComboStats {
        ComboStats {
            params: ParamSet::default()
                .with(Param::ConsistencyPenalty, cp)
                .with(Param::HedgingPenalty, hp),
            ..stats_with(0.0, 0.0, score)
        }
    }

    #[test]
    fn sensitivity_flags_ranges_above_threshold() {
        let grid = ParamGrid::new()
            .axis(Param::ConsistencyPenalty, vec![0.1, 0.2])
            .axis(Param::HedgingPenalty, vec![0.0, 0.1]);
        let combos = vec![
            combo(0.1, 0.0, 0.80),
            combo(0.1, 0.1, 0.72),
            combo(0.2, 0.0, 0.68),
            combo(0.2, 0.1, 0.10),
        ];
        let best = combos[0].params.clone();
        let sens = sensitivity_analysis(&grid, &combos, &best);

        let cp = &sens[&Param::ConsistencyPenalty];
        assert!((cp.range - 0.12).abs() < 1e-9);
        assert!(cp.critical);
        assert_eq!(cp.by_value.len(), 2);

        let hp = &sens[&Param::HedgingPenalty];
        assert!((hp.range - 0.08).abs() < 1e-9);
        assert!(!hp.critical);
    }
}
