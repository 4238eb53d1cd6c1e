use super::grid::ParamSet;
use crate::scorer::Param;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Range of mean score above which a parameter is flagged critical.
pub const CRITICAL_RANGE: f64 = 0.1;

/// What an evaluation reports for one test fold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub score: f64,
    /// Wrong answers the scorer accepted.
    pub false_passes: f64,
    /// Correct answers the scorer rejected.
    pub false_fails: f64,
}

impl SplitMetrics {
    pub fn is_finite(&self) -> bool {
        self.score.is_finite() && self.false_passes.is_finite() && self.false_fails.is_finite()
    }
}

/// One (combination x split) cell. Exactly one of `metrics` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub repeat_idx: usize,
    pub fold_idx: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub params: ParamSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SplitMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CvResult {
    pub fn is_failed(&self) -> bool {
        self.metrics.is_none()
    }
}

/// Aggregates over the successful cells of one combination. Numeric fields
/// are zero when every cell failed; check [`ComboStats::is_eligible`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboStats {
    pub params: ParamSet,
    pub n_cells: usize,
    pub n_failed: usize,
    pub mean_score: f64,
    pub std_score: f64,
    pub worst_score: f64,
    pub mean_false_passes: f64,
    pub mean_false_fails: f64,
}

impl ComboStats {
    pub fn is_eligible(&self) -> bool {
        self.n_cells > self.n_failed
    }

    /// Lexicographic objective: fewer false passes, then fewer false fails,
    /// then higher mean score. `Less` means `self` is the better choice.
    pub fn objective_cmp(&self, other: &ComboStats) -> Ordering {
        self.mean_false_passes
            .total_cmp(&other.mean_false_passes)
            .then(self.mean_false_fails.total_cmp(&other.mean_false_fails))
            .then(other.mean_score.total_cmp(&self.mean_score))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueMean {
    pub value: f64,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensitivity {
    /// max - min of the mean score across this parameter's grid values.
    pub range: f64,
    pub by_value: Vec<ValueMean>,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvStats {
    pub n_folds: usize,
    pub n_repeats: usize,
    pub seed: u64,
    pub n_param_combos: usize,
    pub n_failed_cells: usize,
    pub best_mean_score: f64,
    pub best_std_score: f64,
    pub best_worst_score: f64,
    pub combos: Vec<ComboStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub best_params: ParamSet,
    pub cv_stats: CvStats,
    pub sensitivity_analysis: BTreeMap<Param, Sensitivity>,
    pub all_results: Vec<CvResult>,
}

impl CalibrationResult {
    pub fn critical_params(&self) -> Vec<Param> {
        self.sensitivity_analysis
            .iter()
            .filter(|(_, s)| s.critical)
            .map(|(p, _)| *p)
            .collect()
    }
}
