//! Adversarial items derived from reference tasks.
//!
//! Every transformation is applied to `items_per_cell` tasks sampled from
//! each difficulty group, so the set covers the full transformation by
//! difficulty grid. Sampling and number perturbation draw from one seeded
//! [`Lcg64`] stream; the same tasks and seed give the same items.

pub mod transforms;

pub use transforms::Transformation;

use crate::calibration::folds::Lcg64;
use crate::errors::RecordError;
use crate::judge::record::{read_jsonl, task_id_from_any};
use crate::judge::{
    difficulty_rank, ExpectedOutcome, TaskSource, DIFFICULTY_LEVELS, UNKNOWN_LABEL,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_ITEMS_PER_CELL: usize = 1;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RubricItem {
    #[serde(default)]
    pub criteria: String,
}

/// A task with a known-good answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTask {
    #[serde(deserialize_with = "task_id_from_any")]
    pub task_id: String,
    #[serde(default)]
    pub question: String,
    pub gold_answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rubric: Vec<RubricItem>,
    #[serde(default, alias = "difficulty", skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
}

pub fn read_tasks(path: &Path) -> Result<Vec<ReferenceTask>, RecordError> {
    let tasks: Vec<ReferenceTask> = read_jsonl(path)?;
    tracing::debug!(path = %path.display(), count = tasks.len(), "loaded reference tasks");
    Ok(tasks)
}

/// A wrong candidate answer paired with the verdict a correct scorer
/// should reach on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversarialItem {
    pub adversarial_id: String,
    pub parent_id: String,
    pub source: TaskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    pub question: String,
    pub gold_answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rubric: Vec<RubricItem>,
    pub candidate_answer: String,
    pub transformation_type: Transformation,
    pub expected_outcome: ExpectedOutcome,
    pub notes: String,
}

impl AdversarialItem {
    pub fn difficulty_label(&self) -> &str {
        self.difficulty_level.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// One JSON object per line.
pub fn to_jsonl(items: &[AdversarialItem]) -> Result<String, serde_json::Error> {
    let lines = items
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdversarialGenerator {
    items_per_cell: usize,
    seed: u64,
}

impl Default for AdversarialGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ITEMS_PER_CELL, DEFAULT_SEED)
    }
}

/// Groups in report order: Easy, Medium, Hard, then other labels as first seen.
fn difficulty_groups(tasks: &[ReferenceTask]) -> Vec<(&str, Vec<&ReferenceTask>)> {
    let mut groups: Vec<(&str, Vec<&ReferenceTask>)> = Vec::new();
    for task in tasks {
        let label = task.difficulty_level.as_deref().unwrap_or(UNKNOWN_LABEL);
        match groups.iter().position(|(l, _)| *l == label) {
            Some(i) => groups[i].1.push(task),
            None => groups.push((label, vec![task])),
        }
    }
    groups.sort_by_key(|(label, _)| difficulty_rank(label));
    groups
}

/// `k` distinct members by partial Fisher-Yates.
fn sample<'a, T>(pool: &[&'a T], k: usize, rng: &mut Lcg64) -> Vec<&'a T> {
    let k = k.min(pool.len());
    let mut idx: Vec<usize> = (0..pool.len()).collect();
    for i in 0..k {
        let j = i + rng.next_below(pool.len() - i);
        idx.swap(i, j);
    }
    idx[..k].iter().map(|&i| pool[i]).collect()
}

impl AdversarialGenerator {
    pub fn new(items_per_cell: usize, seed: u64) -> Self {
        Self {
            items_per_cell: items_per_cell.max(1),
            seed,
        }
    }

    pub fn items_per_cell(&self) -> usize {
        self.items_per_cell
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Items are numbered `adv_0000`, `adv_0001`, ... in generation order.
    /// A rewrite that leaves the answer unchanged is dropped.
    pub fn generate(&self, tasks: &[ReferenceTask]) -> Vec<AdversarialItem> {
        let groups = difficulty_groups(tasks);
        let mut rng = Lcg64::new(self.seed);
        let mut items = Vec::new();
        let mut skipped = 0usize;

        for transformation in Transformation::ALL {
            for (label, pool) in &groups {
                for task in sample(pool, self.items_per_cell, &mut rng) {
                    let candidate =
                        match transformation.apply(&task.gold_answer, &task.rubric, &mut rng) {
                            Some(c) if c.trim() != task.gold_answer.trim() => c,
                            _ => {
                                tracing::debug!(
                                    task_id = %task.task_id,
                                    difficulty = *label,
                                    transformation = transformation.as_str(),
                                    "rewrite left the answer unchanged, skipping"
                                );
                                skipped += 1;
                                continue;
                            }
                        };
                    items.push(AdversarialItem {
                        adversarial_id: format!("adv_{:04}", items.len()),
                        parent_id: task.task_id.clone(),
                        source: TaskSource::Adversarial,
                        difficulty_level: task.difficulty_level.clone(),
                        question_type: task.question_type.clone(),
                        question: task.question.clone(),
                        gold_answer: task.gold_answer.clone(),
                        rubric: task.rubric.clone(),
                        candidate_answer: candidate,
                        transformation_type: transformation,
                        expected_outcome: transformation.expected_outcome(),
                        notes: transformation.notes().to_string(),
                    });
                }
            }
        }

        tracing::info!(
            tasks = tasks.len(),
            groups = groups.len(),
            items = items.len(),
            skipped,
            seed = self.seed,
            "generated adversarial items"
        );
        items
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdversarialStats {
    pub total: usize,
    pub by_transformation: BTreeMap<Transformation, usize>,
    pub by_difficulty: BTreeMap<String, usize>,
    pub by_expected_outcome: BTreeMap<ExpectedOutcome, usize>,
    /// Difficulty label -> transformation -> count.
    pub coverage: BTreeMap<String, BTreeMap<Transformation, usize>>,
}

impl AdversarialStats {
    pub fn from_items(items: &[AdversarialItem]) -> Self {
        let mut stats = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            let label = item.difficulty_label().to_string();
            *stats.by_transformation.entry(item.transformation_type).or_default() += 1;
            *stats.by_difficulty.entry(label.clone()).or_default() += 1;
            *stats.by_expected_outcome.entry(item.expected_outcome).or_default() += 1;
            *stats
                .coverage
                .entry(label)
                .or_default()
                .entry(item.transformation_type)
                .or_default() += 1;
        }
        stats
    }

    /// Cells the generator could not fill among the standard difficulty rows.
    pub fn missing_cells(&self) -> Vec<(&'static str, Transformation)> {
        let mut missing = Vec::new();
        for level in DIFFICULTY_LEVELS {
            for t in Transformation::ALL {
                let n = self
                    .coverage
                    .get(level)
                    .and_then(|row| row.get(&t))
                    .copied()
                    .unwrap_or(0);
                if n == 0 {
                    missing.push((level, t));
                }
            }
        }
        missing
    }
}
