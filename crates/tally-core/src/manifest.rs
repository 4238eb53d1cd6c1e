//! Run manifest: the provenance record binding a run's dataset, prompts and
//! scorer configuration together by hash.
//!
//! Two runs are comparable when their manifests agree on every identity
//! field; [`RunManifest::diff`] lists the ones that do not.

use crate::errors::{AuditError, HashError};
use crate::hashing::{Digest, HashAlgorithm, ReproducibilityHasher};
use crate::scorer::ScorerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// `run_<UTC yyyymmdd_HHMMSS>_<8 hex>`.
pub fn generate_run_id() -> String {
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    let short = uuid::Uuid::new_v4().simple().to_string();
    format!("run_{ts}_{}", &short[..8])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    /// Version of the tool that produced the run.
    pub tally_version: String,
    pub dataset_path: PathBuf,
    pub dataset_hash: Digest,
    #[serde(default)]
    pub judge_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub prompt_hashes: BTreeMap<String, Digest>,
    pub scorer_config: ScorerConfig,
    pub scorer_config_hash: Digest,
    pub hash_algorithm: HashAlgorithm,
    pub random_seed: u64,
    #[serde(default)]
    pub total_tasks: usize,
    #[serde(default)]
    pub completed_tasks: usize,
    #[serde(default)]
    pub failed_tasks: usize,
}

/// One identity field that differs between two manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChange {
    pub field: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

impl RunManifest {
    /// Hashes the dataset file and scorer config with `hasher`.
    pub fn create(
        run_id: impl Into<String>,
        dataset_path: &Path,
        hasher: &ReproducibilityHasher,
        scorer_config: ScorerConfig,
        random_seed: u64,
    ) -> Result<Self, HashError> {
        let dataset_hash = hasher.hash_file(dataset_path)?;
        let scorer_config_hash = hasher.hash_dict(&scorer_config)?;
        Ok(Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: run_id.into(),
            created_at: Utc::now(),
            tally_version: env!("CARGO_PKG_VERSION").to_string(),
            dataset_path: dataset_path.to_path_buf(),
            dataset_hash,
            judge_versions: BTreeMap::new(),
            prompt_hashes: BTreeMap::new(),
            scorer_config,
            scorer_config_hash,
            hash_algorithm: hasher.algorithm(),
            random_seed,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
        })
    }

    pub fn with_judge_versions(mut self, versions: BTreeMap<String, String>) -> Self {
        self.judge_versions = versions;
        self
    }

    pub fn add_prompt(
        &mut self,
        hasher: &ReproducibilityHasher,
        name: impl Into<String>,
        template: &str,
        version: &str,
    ) {
        self.prompt_hashes
            .insert(name.into(), hasher.hash_prompt(template, version));
    }

    pub fn record_counts(&mut self, total: usize, completed: usize, failed: usize) {
        self.total_tasks = total;
        self.completed_tasks = completed;
        self.failed_tasks = failed;
    }

    pub fn write(&self, path: &Path) -> Result<(), AuditError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| AuditError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self, AuditError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Identity fields that differ. Run id, timestamps and task counts are
    /// bookkeeping and never reported.
    pub fn diff(&self, other: &RunManifest) -> Vec<ManifestChange> {
        let mut changes = Vec::new();
        let mut cmp = |field: &str, left: Option<String>, right: Option<String>| {
            if left != right {
                changes.push(ManifestChange {
                    field: field.to_string(),
                    left,
                    right,
                });
            }
        };

        cmp(
            "dataset_hash",
            Some(self.dataset_hash.to_string()),
            Some(other.dataset_hash.to_string()),
        );
        cmp(
            "scorer_config_hash",
            Some(self.scorer_config_hash.to_string()),
            Some(other.scorer_config_hash.to_string()),
        );
        cmp(
            "hash_algorithm",
            Some(self.hash_algorithm.to_string()),
            Some(other.hash_algorithm.to_string()),
        );
        cmp(
            "random_seed",
            Some(self.random_seed.to_string()),
            Some(other.random_seed.to_string()),
        );
        cmp(
            "tally_version",
            Some(self.tally_version.clone()),
            Some(other.tally_version.clone()),
        );

        for (prefix, left, right) in [
            ("judge_versions", string_map(&self.judge_versions), string_map(&other.judge_versions)),
            ("prompt_hashes", string_map(&self.prompt_hashes), string_map(&other.prompt_hashes)),
        ] {
            let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            for key in keys {
                cmp(
                    &format!("{prefix}.{key}"),
                    left.get(key).cloned(),
                    right.get(key).cloned(),
                );
            }
        }
        changes
    }
}

fn string_map<V: ToString>(m: &BTreeMap<String, V>) -> BTreeMap<String, String> {
    m.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
}
