//! Judge signals as consumed by the scorer.
//!
//! Judges are external: anything that can produce a [`JudgeOutput`] per
//! judge per task (a live call, an in-process function, a replayed log line)
//! is a valid producer.

pub mod record;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use record::{
    difficulty_rank, group_by_task, read_records, ExpectedOutcome, JudgmentRecord, TaskMeta,
    TaskSource, DIFFICULTY_LEVELS, UNKNOWN_LABEL,
};

/// The three judges whose signals are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeKind {
    Semantic,
    Numeric,
    Contradiction,
}

impl JudgeKind {
    pub const ALL: [JudgeKind; 3] = [
        JudgeKind::Semantic,
        JudgeKind::Numeric,
        JudgeKind::Contradiction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JudgeKind::Semantic => "semantic",
            JudgeKind::Numeric => "numeric",
            JudgeKind::Contradiction => "contradiction",
        }
    }
}

impl fmt::Display for JudgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the contradiction judge.
///
/// `Unknown` is not the same as `Clear`: a failed judgment is no evidence
/// that the answer is free of contradictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContradictionStatus {
    Violated,
    Clear,
    #[default]
    Unknown,
}

impl ContradictionStatus {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Violated,
            Some(false) => Self::Clear,
            None => Self::Unknown,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Violated => Some(true),
            Self::Clear => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Wire form of [`ContradictionStatus`]: `true | false | null`.
mod violated_field {
    use super::ContradictionStatus;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(v: &ContradictionStatus, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        v.as_flag().serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<ContradictionStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        let flag: Option<bool> = Option::deserialize(d)?;
        Ok(ContradictionStatus::from_flag(flag))
    }
}

/// Why a numeric judgment came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericFailure {
    #[default]
    #[serde(rename = "none")]
    NoFailure,
    ExtractionFailed,
    AlignmentFailed,
    ToleranceFailed,
    ParseError,
}

/// A number the numeric judge pulled out of an answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedValue {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub original_text: String,
}

/// Numeric-judge specific fields. They sit flat on the judge output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericDetail {
    /// Relative tolerance the judge compared with; unset when no comparison ran.
    #[serde(default)]
    pub tolerance_used: Option<f64>,
    /// True when numeric values were parsed from the gold answer.
    #[serde(default)]
    pub has_numeric_content: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub parsed_gold_values: Vec<ParsedValue>,
    /// Largest relative difference observed between aligned values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_ratio: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failure_reason: NumericFailure,
}

impl NumericDetail {
    /// Gold-side numbers exist, by flag or by parsed values.
    pub fn gold_has_numbers(&self) -> bool {
        self.has_numeric_content || !self.parsed_gold_values.is_empty()
    }
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn default_ok() -> bool {
    true
}

/// One judge's structured verdict on one answer.
///
/// `score` and `confidence` default to 0 when absent: the contradiction
/// judge speaks through `violated`, and a failed call carries no usable
/// values anyway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutput {
    #[serde(default)]
    pub judge_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_version: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub confidence: f64,
    /// False when the call failed (network, timeout, malformed response).
    /// `score` and `confidence` are then placeholders, not real zeros.
    #[serde(default = "default_ok", alias = "judge_ok")]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    #[serde(flatten)]
    pub numeric: NumericDetail,
    #[serde(default, with = "violated_field")]
    pub violated: ContradictionStatus,
}

impl JudgeOutput {
    pub fn success(kind: JudgeKind, score: f64, confidence: f64) -> Self {
        Self {
            judge_name: kind.as_str().to_string(),
            judge_version: None,
            score,
            confidence,
            ok: true,
            reason: String::new(),
            latency_ms: None,
            prompt_hash: None,
            numeric: NumericDetail::default(),
            violated: ContradictionStatus::Unknown,
        }
    }

    pub fn failed(kind: JudgeKind, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
            ..Self::success(kind, 0.0, 0.0)
        }
    }

    pub fn with_numeric(mut self, tolerance_used: Option<f64>, has_numeric_content: bool) -> Self {
        self.numeric.tolerance_used = tolerance_used;
        self.numeric.has_numeric_content = has_numeric_content;
        self
    }

    pub fn with_diff_ratio(mut self, diff_ratio: f64) -> Self {
        self.numeric.diff_ratio = Some(diff_ratio);
        self
    }

    pub fn with_violated(mut self, violated: bool) -> Self {
        self.violated = ContradictionStatus::from_flag(Some(violated));
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Contradiction status as usable evidence: always `Unknown` for a failed call.
    pub fn contradiction(&self) -> ContradictionStatus {
        if self.ok {
            self.violated
        } else {
            ContradictionStatus::Unknown
        }
    }

    /// Whether a numeric judgment actually compared numbers from the gold answer.
    pub fn has_numeric_comparison(&self) -> bool {
        self.numeric.tolerance_used.is_some() && self.numeric.gold_has_numbers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violated_round_trips_as_nullable_bool() {
        let out = JudgeOutput::success(JudgeKind::Contradiction, 1.0, 0.7).with_violated(true);
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["violated"], serde_json::json!(true));

        let unknown: JudgeOutput =
            serde_json::from_value(serde_json::json!({"score": 0.0, "confidence": 0.0, "violated": null}))
                .unwrap();
        assert_eq!(unknown.violated, ContradictionStatus::Unknown);
    }

    #[test]
    fn failed_judge_never_reports_violation() {
        let mut out = JudgeOutput::failed(JudgeKind::Contradiction, "timeout");
        out.violated = ContradictionStatus::Violated;
        assert_eq!(out.contradiction(), ContradictionStatus::Unknown);
    }

    #[test]
    fn legacy_judge_ok_alias_is_accepted() {
        let out: JudgeOutput = serde_json::from_str(
            r#"{"judge_name":"semantic","score":0.4,"confidence":0.2,"judge_ok":false}"#,
        )
        .unwrap();
        assert!(!out.ok);
        assert_eq!(out.judge_name, "semantic");
    }

    #[test]
    fn numeric_comparison_needs_tolerance_and_gold_values() {
        let base = JudgeOutput::success(JudgeKind::Numeric, 1.0, 1.0);
        assert!(!base.has_numeric_comparison());
        assert!(!base.clone().with_numeric(Some(0.01), false).has_numeric_comparison());
        assert!(!base.clone().with_numeric(None, true).has_numeric_comparison());
        assert!(base.with_numeric(Some(0.01), true).has_numeric_comparison());
    }

    #[test]
    fn numeric_fields_are_read_flat() {
        let out: JudgeOutput = serde_json::from_str(
            r#"{"judge_name":"numeric","score":0.1,"confidence":0.8,"judge_ok":true,
                "tolerance_used":0.01,"has_numeric_content":true,"diff_ratio":0.33,
                "failure_reason":"tolerance_failed"}"#,
        )
        .unwrap();
        assert_eq!(out.numeric.tolerance_used, Some(0.01));
        assert_eq!(out.numeric.diff_ratio, Some(0.33));
        assert_eq!(out.numeric.failure_reason, NumericFailure::ToleranceFailed);
        assert!(out.has_numeric_comparison());

        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["tolerance_used"], serde_json::json!(0.01));
        assert!(v.get("numeric").is_none());
    }

    #[test]
    fn parsed_gold_values_count_as_numeric_content() {
        let out: JudgeOutput = serde_json::from_str(
            r#"{"score":1.0,"confidence":0.9,"tolerance_used":0.01,"failure_reason":null,
                "parsed_gold_values":[{"value":12.5,"unit":"%","original_text":"12.5%"}]}"#,
        )
        .unwrap();
        assert!(!out.numeric.has_numeric_content);
        assert_eq!(out.numeric.failure_reason, NumericFailure::NoFailure);
        assert!(out.has_numeric_comparison());

        let none: JudgeOutput = serde_json::from_str(
            r#"{"score":1.0,"confidence":0.9,"tolerance_used":0.01,"parsed_gold_values":[]}"#,
        )
        .unwrap();
        assert!(!none.has_numeric_comparison());
    }

    #[test]
    fn contradiction_verdict_without_score_parses() {
        let out: JudgeOutput =
            serde_json::from_str(r#"{"violated":false,"confidence":0.5,"ok":true}"#).unwrap();
        assert_eq!(out.score, 0.0);
        assert_eq!(out.confidence, 0.5);
        assert_eq!(out.contradiction(), ContradictionStatus::Clear);

        let failed: JudgeOutput = serde_json::from_str(r#"{"judge_ok":false}"#).unwrap();
        assert!(!failed.ok);
        assert_eq!(failed.contradiction(), ContradictionStatus::Unknown);
    }
}
