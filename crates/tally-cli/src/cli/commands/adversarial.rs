use super::emit;
use crate::cli::args::AdversarialArgs;
use crate::exit_codes;
use tally_core::adversarial::{read_tasks, to_jsonl, AdversarialStats};
use tally_core::config::TallyConfig;

pub fn cmd_adversarial(args: AdversarialArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    let tasks = read_tasks(&args.input)?;
    if tasks.is_empty() {
        anyhow::bail!("config error: {} has no tasks", args.input.display());
    }

    let mut settings = cfg.adversarial;
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if let Some(per_cell) = args.per_cell {
        settings.items_per_cell = per_cell;
    }
    TallyConfig {
        adversarial: settings,
        ..cfg.clone()
    }
    .validate()?;

    let items = settings.generator().generate(&tasks);
    emit(args.out.as_deref(), &to_jsonl(&items)?)?;

    let stats = AdversarialStats::from_items(&items);
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    let missing = stats.missing_cells();
    if !missing.is_empty() {
        let cells: Vec<String> = missing
            .iter()
            .map(|(level, t)| format!("{level}/{}", t.as_str()))
            .collect();
        tracing::warn!(cells = %cells.join(", "), "coverage gaps");
    }
    eprintln!(
        "generated {} adversarial items from {} tasks ({} empty cells)",
        stats.total,
        tasks.len(),
        missing.len()
    );
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tally_core::adversarial::AdversarialItem;

    #[test]
    fn writes_one_item_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tasks.jsonl");
        let mut f = std::fs::File::create(&input).unwrap();
        for (id, level) in [(1, "Easy"), (2, "Medium"), (3, "Hard")] {
            writeln!(
                f,
                r#"{{"task_id": {id}, "question": "How did revenue change?", "gold_answer": "Revenue grew 8% to $1.3 billion.", "difficulty_level": "{level}"}}"#
            )
            .unwrap();
        }
        drop(f);

        let out = dir.path().join("adversarial.jsonl");
        let args = AdversarialArgs {
            input,
            out: Some(out.clone()),
            seed: Some(3),
            per_cell: None,
        };
        assert_eq!(
            cmd_adversarial(args, &TallyConfig::default()).unwrap(),
            exit_codes::SUCCESS
        );

        let raw = std::fs::read_to_string(&out).unwrap();
        let items: Vec<AdversarialItem> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(items.len(), 18);
        assert!(AdversarialStats::from_items(&items).missing_cells().is_empty());
    }

    #[test]
    fn rejects_zero_items_per_cell() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"task_id": "a", "gold_answer": "12%"}}"#).unwrap();
        let args = AdversarialArgs {
            input: f.path().to_path_buf(),
            out: None,
            seed: None,
            per_cell: Some(0),
        };
        let err = cmd_adversarial(args, &TallyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("items_per_cell"));
    }
}
