pub mod adversarial;
pub mod audit;
pub mod calibration;
pub mod config;
pub mod errors;
pub mod hashing;
pub mod judge;
pub mod manifest;
pub mod scorer;
pub mod stability;
pub mod summary;

pub use calibration::{CalibrationResult, Calibrator, KFold, ParamGrid, ReplayEvaluator};
pub use hashing::{Digest, HashAlgorithm, ReproducibilityHasher};
pub use judge::{JudgeOutput, JudgmentRecord};
pub use scorer::{HybridScore, HybridScorer, ScorerConfig};
pub use stability::{StabilityReport, StabilityTester};
pub use summary::TraceSummary;
