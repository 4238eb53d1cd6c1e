//! Repeated K-fold splits with a pinned shuffle.
//!
//! The permutation for repeat `r` is a Fisher-Yates shuffle of `0..n`
//! driven by a 64-bit LCG seeded with `base_seed + r` (wrapping):
//!
//! ```text
//! state  = state * 6364136223846793005 + 1442695040888963407   (mod 2^64)
//! draw   = state >> 32                                          (u32)
//! j      = (draw * (i + 1)) >> 32     for i = n-1 down to 1; swap(i, j)
//! ```
//!
//! Any implementation following these three lines reproduces the splits
//! bit for bit.

use crate::errors::CalibrationError;
use serde::{Deserialize, Serialize};

const LCG_MULTIPLIER: u64 = 6364136223846793005;
const LCG_INCREMENT: u64 = 1442695040888963407;

#[derive(Debug, Clone)]
pub struct Lcg64 {
    state: u64,
}

impl Lcg64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        (self.state >> 32) as u32
    }

    /// Uniform-ish index in `0..bound` by multiply-shift. `bound` must fit in u32.
    pub fn next_below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0 && bound as u64 <= u64::from(u32::MAX));
        ((u64::from(self.next_u32()) * bound as u64) >> 32) as usize
    }
}

pub fn seeded_permutation(n: usize, seed: u64) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = Lcg64::new(seed);
    for i in (1..n).rev() {
        let j = rng.next_below(i + 1);
        idx.swap(i, j);
    }
    idx
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub repeat_idx: usize,
    pub fold_idx: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
}

impl Default for KFold {
    fn default() -> Self {
        Self {
            folds: 5,
            repeats: 5,
            seed: 42,
        }
    }
}

impl KFold {
    pub fn new(folds: usize, repeats: usize, seed: u64) -> Self {
        Self {
            folds,
            repeats,
            seed,
        }
    }

    pub fn validate(&self, n_samples: usize) -> Result<(), CalibrationError> {
        if self.folds < 2 {
            return Err(CalibrationError::TooFewFolds(self.folds));
        }
        if self.repeats == 0 {
            return Err(CalibrationError::NoRepeats);
        }
        if n_samples < self.folds {
            return Err(CalibrationError::TooFewSamples {
                samples: n_samples,
                folds: self.folds,
            });
        }
        Ok(())
    }

    /// All `repeats * folds` splits, repeat-major. The last fold of each
    /// repeat absorbs the remainder of `n_samples / folds`.
    pub fn generate_splits(&self, n_samples: usize) -> Result<Vec<Split>, CalibrationError> {
        self.validate(n_samples)?;

        let fold_size = n_samples / self.folds;
        let mut splits = Vec::with_capacity(self.folds * self.repeats);
        for repeat_idx in 0..self.repeats {
            let perm = seeded_permutation(n_samples, self.seed.wrapping_add(repeat_idx as u64));
            for fold_idx in 0..self.folds {
                let start = fold_idx * fold_size;
                let end = if fold_idx + 1 == self.folds {
                    n_samples
                } else {
                    start + fold_size
                };
                let test_indices = perm[start..end].to_vec();
                let train_indices = perm[..start]
                    .iter()
                    .chain(&perm[end..])
                    .copied()
                    .collect();
                splits.push(Split {
                    repeat_idx,
                    fold_idx,
                    train_indices,
                    test_indices,
                });
            }
        }
        Ok(splits)
    }
}
