use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The tunable scalars of the hybrid scorer. An exhaustive grid over all of
/// them must stay tractable, so there are only five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    NumericRelTol,
    SemanticConfThreshold,
    ConsistencyPenalty,
    ContradictionPenalty,
    HedgingPenalty,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::NumericRelTol,
        Param::SemanticConfThreshold,
        Param::ConsistencyPenalty,
        Param::ContradictionPenalty,
        Param::HedgingPenalty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Param::NumericRelTol => "numeric_rel_tol",
            Param::SemanticConfThreshold => "semantic_conf_threshold",
            Param::ConsistencyPenalty => "consistency_penalty",
            Param::ContradictionPenalty => "contradiction_penalty",
            Param::HedgingPenalty => "hedging_penalty",
        }
    }

    /// Checks one value against this parameter's domain.
    pub fn validate(self, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::invalid(self.as_str(), "must be finite"));
        }
        match self {
            Param::NumericRelTol if value <= 0.0 => {
                Err(ConfigError::invalid(self.as_str(), "must be > 0"))
            }
            Param::SemanticConfThreshold if !(0.0..=1.0).contains(&value) => {
                Err(ConfigError::invalid(self.as_str(), "must be within [0, 1]"))
            }
            Param::ConsistencyPenalty | Param::ContradictionPenalty | Param::HedgingPenalty
                if value < 0.0 =>
            {
                Err(ConfigError::invalid(self.as_str(), "must be >= 0"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Param {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigError::invalid(s, "unknown scorer parameter"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScorerConfig {
    /// Relative tolerance for numeric comparison (0.01 = 1%).
    pub numeric_rel_tol: f64,
    /// Minimum final score for an answer to count as a pass.
    pub semantic_conf_threshold: f64,
    pub consistency_penalty: f64,
    pub contradiction_penalty: f64,
    pub hedging_penalty: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            numeric_rel_tol: 0.01,
            semantic_conf_threshold: 0.7,
            consistency_penalty: 0.2,
            contradiction_penalty: 0.5,
            hedging_penalty: 0.1,
        }
    }
}

impl ScorerConfig {
    pub fn get(&self, param: Param) -> f64 {
        match param {
            Param::NumericRelTol => self.numeric_rel_tol,
            Param::SemanticConfThreshold => self.semantic_conf_threshold,
            Param::ConsistencyPenalty => self.consistency_penalty,
            Param::ContradictionPenalty => self.contradiction_penalty,
            Param::HedgingPenalty => self.hedging_penalty,
        }
    }

    pub fn set(&mut self, param: Param, value: f64) {
        let slot = match param {
            Param::NumericRelTol => &mut self.numeric_rel_tol,
            Param::SemanticConfThreshold => &mut self.semantic_conf_threshold,
            Param::ConsistencyPenalty => &mut self.consistency_penalty,
            Param::ContradictionPenalty => &mut self.contradiction_penalty,
            Param::HedgingPenalty => &mut self.hedging_penalty,
        };
        *slot = value;
    }

    pub fn with(mut self, param: Param, value: f64) -> Self {
        self.set(param, value);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for p in Param::ALL {
            p.validate(self.get(p))?;
        }
        Ok(())
    }
}
