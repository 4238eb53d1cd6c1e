use crate::adversarial::{AdversarialGenerator, DEFAULT_ITEMS_PER_CELL, DEFAULT_SEED};
use crate::calibration::{Calibrator, KFold, ParamGrid};
use crate::errors::ConfigError;
use crate::hashing::{HashAlgorithm, ReproducibilityHasher};
use crate::scorer::ScorerConfig;
use crate::stability::{StabilityTester, DEFAULT_RUNS, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "tally.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    pub version: u32,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub calibration: CalibrationSettings,
    #[serde(default)]
    pub stability: StabilitySettings,
    #[serde(default)]
    pub hashing: HashingSettings,
    #[serde(default)]
    pub adversarial: AdversarialSettings,
    /// Judge name -> version, stamped into run manifests.
    #[serde(default)]
    pub judge_versions: BTreeMap<String, String>,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            scorer: ScorerConfig::default(),
            calibration: CalibrationSettings::default(),
            stability: StabilitySettings::default(),
            hashing: HashingSettings::default(),
            adversarial: AdversarialSettings::default(),
            judge_versions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CalibrationSettings {
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
    pub max_parallel: usize,
    pub grid: ParamGrid,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        let cv = KFold::default();
        Self {
            folds: cv.folds,
            repeats: cv.repeats,
            seed: cv.seed,
            max_parallel: 4,
            grid: ParamGrid::default(),
        }
    }
}

impl CalibrationSettings {
    pub fn kfold(&self) -> KFold {
        KFold::new(self.folds, self.repeats, self.seed)
    }

    pub fn calibrator(&self) -> Calibrator {
        Calibrator::new(self.kfold(), self.max_parallel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StabilitySettings {
    pub runs: usize,
    pub threshold: f64,
    pub max_parallel: usize,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            threshold: DEFAULT_THRESHOLD,
            max_parallel: 4,
        }
    }
}

impl StabilitySettings {
    pub fn tester(&self) -> StabilityTester {
        StabilityTester::new(self.runs, self.threshold).with_max_parallel(self.max_parallel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HashingSettings {
    pub algorithm: HashAlgorithm,
}

impl HashingSettings {
    pub fn hasher(&self) -> ReproducibilityHasher {
        ReproducibilityHasher::new(self.algorithm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AdversarialSettings {
    /// Tasks sampled per transformation and difficulty.
    pub items_per_cell: usize,
    pub seed: u64,
}

impl Default for AdversarialSettings {
    fn default() -> Self {
        Self {
            items_per_cell: DEFAULT_ITEMS_PER_CELL,
            seed: DEFAULT_SEED,
        }
    }
}

impl AdversarialSettings {
    pub fn generator(&self) -> AdversarialGenerator {
        AdversarialGenerator::new(self.items_per_cell, self.seed)
    }
}

impl TallyConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: TallyConfig = serde_yaml::from_str(raw)?;
        if cfg.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: cfg.version,
                supported: SUPPORTED_CONFIG_VERSION,
            });
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scorer.validate()?;

        let cal = &self.calibration;
        if cal.folds < 2 {
            return Err(ConfigError::invalid("calibration.folds", "must be >= 2"));
        }
        if cal.repeats < 1 {
            return Err(ConfigError::invalid("calibration.repeats", "must be >= 1"));
        }
        if cal.max_parallel < 1 {
            return Err(ConfigError::invalid("calibration.max_parallel", "must be >= 1"));
        }
        if cal.grid.is_empty() {
            return Err(ConfigError::invalid("calibration.grid", "needs at least one axis"));
        }
        cal.grid.validate()?;

        let st = &self.stability;
        if st.runs < 1 {
            return Err(ConfigError::invalid("stability.runs", "must be >= 1"));
        }
        if !st.threshold.is_finite() || st.threshold <= 0.0 {
            return Err(ConfigError::invalid("stability.threshold", "must be > 0"));
        }
        if st.max_parallel < 1 {
            return Err(ConfigError::invalid("stability.max_parallel", "must be >= 1"));
        }

        if self.adversarial.items_per_cell < 1 {
            return Err(ConfigError::invalid("adversarial.items_per_cell", "must be >= 1"));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<TallyConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = TallyConfig::from_yaml_str(&raw)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}

/// Loads `path` when given, otherwise `tally.yaml` in the working directory
/// if it exists, otherwise the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<TallyConfig, ConfigError> {
    match path {
        Some(p) => load_config(p),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                load_config(fallback)
            } else {
                Ok(TallyConfig::default())
            }
        }
    }
}
