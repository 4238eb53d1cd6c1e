//! Hybrid scorer: three judge signals plus the raw answers in, one score out.
//!
//! Scoring never fails. A judge that could not answer is excluded from the
//! base score and recorded in `error_taxonomy`; the caller always gets a
//! complete [`HybridScore`].
//!
//! ```text
//! base  = semantic/numeric combination (see `select_base`)
//! final = max(0, base - (consistency + contradiction + hedging))
//! ```

pub mod config;
pub mod hedging;

pub use config::{Param, ScorerConfig};

use crate::errors::ConfigError;
use crate::judge::{ContradictionStatus, JudgeOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Both signals must clear these bands for a consistency flag to fire.
const HIGH_BAND: f64 = 0.8;
const LOW_BAND: f64 = 0.3;

/// Labels explaining why a penalty was applied or a fallback was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyFlag {
    /// Semantics look right but the numbers are off.
    NumericError,
    /// Numbers match but the answer addresses the wrong thing.
    WrongMetric,
    ContradictionViolated,
    HedgedAnswer,
    AllJudgesFailed,
}

/// Closed taxonomy of scoring-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SemanticJudgeError,
    NumericJudgeError,
    ContradictionJudgeError,
    AllJudgesFailed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SemanticJudgeError => "semantic_judge_error",
            ErrorKind::NumericJudgeError => "numeric_judge_error",
            ErrorKind::ContradictionJudgeError => "contradiction_judge_error",
            ErrorKind::AllJudgesFailed => "all_judges_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridScore {
    pub exact_match: bool,
    pub semantic_score: f64,
    pub numeric_score: f64,
    pub contradiction_violated: bool,
    pub base_score: f64,
    pub consistency_penalty: f64,
    pub contradiction_penalty: f64,
    pub hedging_penalty: f64,
    pub final_score: f64,
    pub confidence: f64,
    pub consistency_flags: BTreeSet<ConsistencyFlag>,
    pub error_taxonomy: BTreeSet<ErrorKind>,
}

impl HybridScore {
    pub fn total_penalty(&self) -> f64 {
        self.consistency_penalty + self.contradiction_penalty + self.hedging_penalty
    }

    pub fn has_flag(&self, flag: ConsistencyFlag) -> bool {
        self.consistency_flags.contains(&flag)
    }

    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.error_taxonomy.contains(&kind)
    }

    /// Pass/fail verdict against a threshold on `final_score`.
    pub fn passes(&self, threshold: f64) -> bool {
        self.final_score >= threshold
    }
}

/// Inputs and intermediate values behind one [`HybridScore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub raw_semantic: f64,
    pub raw_numeric: f64,
    pub semantic_confidence: f64,
    pub numeric_confidence: f64,
    pub contradiction_confidence: f64,
    pub numeric_relevant: bool,
    pub base_score: f64,
    pub consistency_penalty: f64,
    pub contradiction_penalty: f64,
    pub hedging_penalty: f64,
    pub total_penalty: f64,
    pub final_score: f64,
    pub hedging_phrases: Vec<String>,
    pub config_used: ScorerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub score: HybridScore,
    pub breakdown: ScoreBreakdown,
}

/// Clamp into [0, 1]; NaN counts as 0.
fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive, whitespace-normalized equality. Empty answers never match.
pub fn exact_match(model_answer: &str, gold_answer: &str) -> bool {
    if model_answer.trim().is_empty() || gold_answer.trim().is_empty() {
        return false;
    }
    normalize(model_answer) == normalize(gold_answer)
}

/// Stateless, cheap to clone; construct one per config and share freely.
#[derive(Debug, Clone, Default)]
pub struct HybridScorer {
    config: ScorerConfig,
}

impl HybridScorer {
    /// `config` must satisfy [`ScorerConfig::validate`]; a negative weight
    /// would let `final_score` exceed `base_score`. Use [`HybridScorer::try_new`]
    /// for configs that have not been checked.
    pub fn new(config: ScorerConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "invalid scorer config: {config:?}");
        Self { config }
    }

    pub fn try_new(config: ScorerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn compute(
        &self,
        semantic: &JudgeOutput,
        numeric: &JudgeOutput,
        contradiction: &JudgeOutput,
        model_answer: &str,
        gold_answer: &str,
    ) -> HybridScore {
        self.compute_with_breakdown(semantic, numeric, contradiction, model_answer, gold_answer)
            .score
    }

    pub fn compute_with_breakdown(
        &self,
        semantic: &JudgeOutput,
        numeric: &JudgeOutput,
        contradiction: &JudgeOutput,
        model_answer: &str,
        gold_answer: &str,
    ) -> ScoredAnswer {
        let cfg = &self.config;
        let mut flags = BTreeSet::new();
        let mut errors = BTreeSet::new();

        if !semantic.ok {
            errors.insert(ErrorKind::SemanticJudgeError);
        }
        if !numeric.ok {
            errors.insert(ErrorKind::NumericJudgeError);
        }
        if !contradiction.ok {
            errors.insert(ErrorKind::ContradictionJudgeError);
        }

        let semantic_score = if semantic.ok { unit(semantic.score) } else { 0.0 };
        let numeric_score = if numeric.ok { unit(numeric.score) } else { 0.0 };
        let semantic_conf = unit(semantic.confidence);
        let numeric_conf = unit(numeric.confidence);
        let contradiction_conf = unit(contradiction.confidence);
        let numeric_relevant = numeric.ok && numeric.has_numeric_comparison();

        let base_score = match (semantic.ok, numeric.ok) {
            (false, false) => {
                flags.insert(ConsistencyFlag::AllJudgesFailed);
                errors.insert(ErrorKind::AllJudgesFailed);
                0.0
            }
            (true, false) => semantic_score,
            (false, true) => numeric_score,
            (true, true) if !numeric_relevant => semantic_score,
            (true, true) => 0.5 * semantic_score + 0.5 * numeric_score,
        };

        // Opposite score bands, so at most one fires for valid inputs; each is
        // still checked on its own.
        let mut consistency_penalty = 0.0;
        if semantic.ok && numeric.ok {
            let disagreement = cfg.consistency_penalty * semantic_conf.max(numeric_conf);
            if semantic_score > HIGH_BAND && numeric_score < LOW_BAND {
                flags.insert(ConsistencyFlag::NumericError);
                consistency_penalty += disagreement;
            }
            if numeric_score > HIGH_BAND && semantic_score < LOW_BAND {
                flags.insert(ConsistencyFlag::WrongMetric);
                consistency_penalty += disagreement;
            }
        }

        let contradiction_violated = contradiction.contradiction() == ContradictionStatus::Violated;
        let contradiction_penalty = if contradiction_violated {
            flags.insert(ConsistencyFlag::ContradictionViolated);
            cfg.contradiction_penalty * contradiction_conf
        } else {
            0.0
        };

        let hedges = hedging::find_hedges(model_answer);
        let hedging_penalty = if hedges.is_empty() {
            0.0
        } else {
            flags.insert(ConsistencyFlag::HedgedAnswer);
            cfg.hedging_penalty
        };

        let total_penalty = consistency_penalty + contradiction_penalty + hedging_penalty;
        let final_score = (base_score - total_penalty).max(0.0);

        // Reported confidences are averaged even for failed judges.
        let confidence = (semantic_conf + numeric_conf + contradiction_conf) / 3.0;

        tracing::debug!(
            base_score,
            final_score,
            total_penalty,
            errors = errors.len(),
            "hybrid score computed"
        );

        let score = HybridScore {
            exact_match: exact_match(model_answer, gold_answer),
            semantic_score,
            numeric_score,
            contradiction_violated,
            base_score,
            consistency_penalty,
            contradiction_penalty,
            hedging_penalty,
            final_score,
            confidence,
            consistency_flags: flags,
            error_taxonomy: errors,
        };

        let breakdown = ScoreBreakdown {
            raw_semantic: semantic.score,
            raw_numeric: numeric.score,
            semantic_confidence: semantic.confidence,
            numeric_confidence: numeric.confidence,
            contradiction_confidence: contradiction.confidence,
            numeric_relevant,
            base_score,
            consistency_penalty,
            contradiction_penalty,
            hedging_penalty,
            total_penalty,
            final_score,
            hedging_phrases: hedges.into_iter().map(str::to_string).collect(),
            config_used: *cfg,
        };

        ScoredAnswer { score, breakdown }
    }
}
