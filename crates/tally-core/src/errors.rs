//! Error types for the tally core.
//!
//! Scoring and stability testing never fail; these enums cover the
//! boundaries that do: config files, experiment design, record files,
//! digests and the audit log.

use std::path::PathBuf;

/// Config loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unsupported config version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Experiment-design errors raised before any evaluation starts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibrationError {
    #[error("need at least 2 folds, got {0}")]
    TooFewFolds(usize),

    #[error("need at least 1 repeat")]
    NoRepeats,

    #[error("cannot split {samples} samples into {folds} folds")]
    TooFewSamples { samples: usize, folds: usize },

    #[error("parameter grid is empty")]
    EmptyGrid,

    #[error("grid axis '{0}' has no values")]
    EmptyAxis(String),
}

/// Errors reading recorded judgments.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: malformed record: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown task source '{0}' (expected canonical or adversarial)")]
    UnknownSource(String),
}

/// Digest parsing, hashing and verification errors.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("unknown hash algorithm '{0}' (expected sha256, blake3 or md5)")]
    UnknownAlgorithm(String),

    #[error("malformed digest '{0}': expected '<algorithm>:<hex>'")]
    MalformedDigest(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to canonicalize value: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

/// Audit log and manifest persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit log lock poisoned")]
    Poisoned,
}

impl AuditError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
