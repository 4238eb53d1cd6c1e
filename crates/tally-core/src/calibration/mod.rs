//! Parameter calibration by repeated K-fold cross-validation.
//!
//! A [`Calibrator`] sweeps a [`ParamGrid`] over every split produced by
//! [`KFold`], asks a [`SplitEvaluator`] for metrics on each cell, and picks
//! the combination with the fewest false passes, then the fewest false
//! fails, then the highest mean score.

pub mod folds;
pub mod grid;
pub mod model;
pub mod replay;
pub mod runner;
pub mod selection;
pub mod stats;

pub use folds::{seeded_permutation, KFold, Split};
pub use grid::{ParamGrid, ParamSet};
pub use model::{
    CalibrationResult, ComboStats, CvResult, CvStats, Sensitivity, SplitMetrics, ValueMean,
    CRITICAL_RANGE,
};
pub use replay::{rescore, ReplayEvaluator};
pub use runner::{Calibrator, FnEvaluator, SplitEvaluator};
