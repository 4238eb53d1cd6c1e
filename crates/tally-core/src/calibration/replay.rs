//! Calibration over recorded judgments: every grid cell rescores the
//! test fold offline, so a sweep costs no judge calls.

use super::grid::ParamSet;
use super::model::SplitMetrics;
use super::runner::SplitEvaluator;
use crate::judge::{JudgeOutput, JudgmentRecord};
use crate::scorer::{HybridScore, HybridScorer, ScorerConfig};
use async_trait::async_trait;

/// Numeric verdict recomputed at `tol` from the recorded relative error.
/// Records without a `diff_ratio` keep their original score.
fn at_tolerance(numeric: &JudgeOutput, tol: f64) -> JudgeOutput {
    let mut out = numeric.clone();
    if let (true, Some(diff)) = (out.ok, out.numeric.diff_ratio) {
        out.numeric.tolerance_used = Some(tol);
        out.score = if diff <= tol { 1.0 } else { 0.0 };
    }
    out
}

/// Scores one record under `config`, re-deriving the numeric signal at
/// `config.numeric_rel_tol`.
pub fn rescore(record: &JudgmentRecord, config: &ScorerConfig) -> HybridScore {
    let numeric = at_tolerance(&record.numeric, config.numeric_rel_tol);
    HybridScorer::new(*config).compute(
        &record.semantic,
        &numeric,
        &record.contradiction,
        &record.model_answer,
        &record.gold_answer,
    )
}

#[derive(Debug, Clone, Default)]
pub struct ReplayEvaluator {
    base: ScorerConfig,
}

impl ReplayEvaluator {
    /// `base` supplies any parameter the grid does not sweep.
    pub fn new(base: ScorerConfig) -> Self {
        Self { base }
    }

    pub fn metrics(&self, test: &[JudgmentRecord], params: &ParamSet) -> anyhow::Result<SplitMetrics> {
        let config = params.apply(&self.base);
        let mut labeled = 0usize;
        let mut correct = 0usize;
        let mut false_passes = 0usize;
        let mut false_fails = 0usize;

        for record in test {
            let Some(expected) = record.expected_outcome else {
                continue;
            };
            labeled += 1;
            let passed = rescore(record, &config).passes(config.semantic_conf_threshold);
            match (expected.expects_pass(), passed) {
                (true, true) | (false, false) => correct += 1,
                (false, true) => false_passes += 1,
                (true, false) => false_fails += 1,
            }
        }

        if labeled == 0 {
            anyhow::bail!("test fold has no labeled records ({} unlabeled)", test.len());
        }
        Ok(SplitMetrics {
            score: correct as f64 / labeled as f64,
            false_passes: false_passes as f64,
            false_fails: false_fails as f64,
        })
    }
}

#[async_trait]
impl SplitEvaluator<JudgmentRecord> for ReplayEvaluator {
    async fn evaluate(
        &self,
        _train: &[JudgmentRecord],
        test: &[JudgmentRecord],
        params: &ParamSet,
    ) -> anyhow::Result<SplitMetrics> {
        self.metrics(test, params)
    }
}
