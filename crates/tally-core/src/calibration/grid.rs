use crate::errors::{CalibrationError, ConfigError};
use crate::scorer::{Param, ScorerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One point in the grid: a value for every axis of the grid it came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<Param, f64>);

impl ParamSet {
    pub fn get(&self, param: Param) -> Option<f64> {
        self.0.get(&param).copied()
    }

    pub fn insert(&mut self, param: Param, value: f64) {
        self.0.insert(param, value);
    }

    pub fn with(mut self, param: Param, value: f64) -> Self {
        self.insert(param, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, f64)> + '_ {
        self.0.iter().map(|(p, v)| (*p, *v))
    }

    /// Overrides `base` with every parameter present in this set.
    pub fn apply(&self, base: &ScorerConfig) -> ScorerConfig {
        let mut cfg = *base;
        for (p, v) in self.iter() {
            cfg.set(p, v);
        }
        cfg
    }

    /// True when both sets agree on every parameter except `free`.
    pub(crate) fn matches_except(&self, other: &ParamSet, free: Param) -> bool {
        self.0
            .iter()
            .filter(|(p, _)| **p != free)
            .all(|(p, v)| other.get(*p) == Some(*v))
    }
}

impl std::fmt::Display for ParamSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.iter().map(|(p, v)| format!("{p}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Search space: candidate values per tunable parameter.
///
/// Axes are kept in [`Param`] order, which is also the combination
/// iteration order (the last axis varies fastest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid(BTreeMap<Param, Vec<f64>>);

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid::new()
            .axis(Param::NumericRelTol, vec![0.005, 0.01, 0.02, 0.05])
            .axis(Param::SemanticConfThreshold, vec![0.5, 0.6, 0.7, 0.8])
            .axis(Param::ConsistencyPenalty, vec![0.1, 0.2, 0.3])
            .axis(Param::ContradictionPenalty, vec![0.3, 0.4, 0.5])
            .axis(Param::HedgingPenalty, vec![0.0, 0.1, 0.2])
    }
}

impl ParamGrid {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn axis(mut self, param: Param, values: Vec<f64>) -> Self {
        self.0.insert(param, values);
        self
    }

    pub fn params(&self) -> impl Iterator<Item = Param> + '_ {
        self.0.keys().copied()
    }

    pub fn values(&self, param: Param) -> &[f64] {
        self.0.get(&param).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn n_combinations(&self) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        self.0.values().map(Vec::len).product()
    }

    /// Shape check used before a calibration run.
    pub fn check_shape(&self) -> Result<(), CalibrationError> {
        if self.0.is_empty() {
            return Err(CalibrationError::EmptyGrid);
        }
        if let Some((p, _)) = self.0.iter().find(|(_, v)| v.is_empty()) {
            return Err(CalibrationError::EmptyAxis(p.as_str().to_string()));
        }
        Ok(())
    }

    /// Domain check on every grid value, used when loading config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (p, values) in &self.0 {
            if values.is_empty() {
                return Err(ConfigError::invalid(
                    format!("calibration.grid.{p}"),
                    "needs at least one value",
                ));
            }
            for v in values {
                p.validate(*v)?;
            }
        }
        Ok(())
    }

    /// Cartesian product of all axes.
    pub fn combinations(&self) -> Vec<ParamSet> {
        if self.0.is_empty() || self.0.values().any(Vec::is_empty) {
            return Vec::new();
        }
        let axes: Vec<(Param, &Vec<f64>)> = self.0.iter().map(|(p, v)| (*p, v)).collect();
        let mut cursor = vec![0usize; axes.len()];
        let mut out = Vec::with_capacity(self.n_combinations());
        loop {
            let mut set = ParamSet::default();
            for (k, (p, values)) in axes.iter().enumerate() {
                set.insert(*p, values[cursor[k]]);
            }
            out.push(set);

            // odometer increment, last axis fastest
            let mut k = axes.len();
            loop {
                if k == 0 {
                    return out;
                }
                k -= 1;
                cursor[k] += 1;
                if cursor[k] < axes[k].1.len() {
                    break;
                }
                cursor[k] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_order_is_last_axis_fastest() {
        let grid = ParamGrid::new()
            .axis(Param::ConsistencyPenalty, vec![0.1, 0.2])
            .axis(Param::HedgingPenalty, vec![0.0, 0.1, 0.2]);
        let combos = grid.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0].get(Param::ConsistencyPenalty), Some(0.1));
        assert_eq!(combos[0].get(Param::HedgingPenalty), Some(0.0));
        assert_eq!(combos[1].get(Param::HedgingPenalty), Some(0.1));
        assert_eq!(combos[3].get(Param::ConsistencyPenalty), Some(0.2));
        assert_eq!(combos[3].get(Param::HedgingPenalty), Some(0.0));
    }

    #[test]
    fn default_grid_covers_all_params() {
        let grid = ParamGrid::default();
        assert_eq!(grid.params().count(), Param::ALL.len());
        assert_eq!(grid.n_combinations(), 4 * 4 * 3 * 3 * 3);
        assert_eq!(grid.combinations().len(), grid.n_combinations());
        grid.validate().unwrap();
    }

    #[test]
    fn shape_errors() {
        assert_eq!(ParamGrid::new().check_shape(), Err(CalibrationError::EmptyGrid));
        let grid = ParamGrid::new().axis(Param::HedgingPenalty, vec![]);
        assert_eq!(
            grid.check_shape(),
            Err(CalibrationError::EmptyAxis("hedging_penalty".into()))
        );
        assert!(grid.combinations().is_empty());
    }

    #[test]
    fn apply_overrides_only_present_params() {
        let set = ParamSet::default().with(Param::HedgingPenalty, 0.3);
        let cfg = set.apply(&ScorerConfig::default());
        assert_eq!(cfg.hedging_penalty, 0.3);
        assert_eq!(cfg.consistency_penalty, ScorerConfig::default().consistency_penalty);
    }

    #[test]
    fn yaml_grid_uses_param_names() {
        let grid: ParamGrid =
            serde_yaml::from_str("hedging_penalty: [0.0, 0.1]\nconsistency_penalty: [0.2]\n").unwrap();
        assert_eq!(grid.values(Param::HedgingPenalty), &[0.0, 0.1]);
        assert!(serde_yaml::from_str::<ParamGrid>("temperature: [0.1]\n").is_err());
    }
}
