use super::emit;
use crate::cli::args::SummaryArgs;
use crate::exit_codes;
use tally_core::audit::{read_trace_file, trace_file};
use tally_core::summary::TraceSummary;

pub fn cmd_summary(args: SummaryArgs) -> anyhow::Result<i32> {
    let path = trace_file(&args.run_dir, args.source);
    let traces = read_trace_file(&path)?;
    let Some(summary) = TraceSummary::compute(&traces) else {
        anyhow::bail!("config error: no traces in {}", path.display());
    };

    emit(args.out.as_deref(), &serde_json::to_string_pretty(&summary)?)?;
    eprintln!(
        "{} tasks, avg {:.3}, contradiction {:.1}%, disagreement {:.1}%",
        summary.overall.total_tasks,
        summary.overall.avg_final_score,
        summary.overall.contradiction_rate * 100.0,
        summary.overall.disagreement_rate * 100.0
    );
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ScoreArgs;
    use crate::cli::commands::score::cmd_score;
    use std::io::Write;
    use tally_core::config::TallyConfig;
    use tally_core::judge::TaskSource;

    const RECORDS: [&str; 2] = [
        r#"{"task_id": 1, "difficulty_level": "Easy", "model_answer": "Margin was 14%.", "gold_answer": "Margin was 21%.", "semantic": {"score": 0.9, "confidence": 0.9}, "numeric": {"score": 0.1, "confidence": 0.8, "tolerance_used": 0.01, "has_numeric_content": true}, "contradiction": {"violated": false, "confidence": 0.5}}"#,
        r#"{"task_id": 2, "difficulty_level": "Hard", "model_answer": "Margin was 21%.", "gold_answer": "Margin was 21%.", "semantic": {"score": 1.0, "confidence": 0.9}, "numeric": {"score": 1.0, "confidence": 0.9, "tolerance_used": 0.01, "has_numeric_content": true}, "contradiction": {"violated": false, "confidence": 0.9}}"#,
    ];

    #[test]
    fn summarizes_a_scored_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let mut f = std::fs::File::create(&input).unwrap();
        for r in RECORDS {
            writeln!(f, "{r}").unwrap();
        }
        drop(f);
        let logs = dir.path().join("logs");
        let score_args = ScoreArgs {
            input,
            out: Some(dir.path().join("scores.jsonl")),
            logs_dir: Some(logs.clone()),
            breakdown: false,
        };
        cmd_score(score_args, &TallyConfig::default()).unwrap();
        let run_dir = logs.join(&tally_core::audit::list_runs(&logs).unwrap()[0]);

        let out = dir.path().join("summary.json");
        let args = SummaryArgs {
            run_dir: run_dir.clone(),
            source: TaskSource::Canonical,
            out: Some(out.clone()),
        };
        assert_eq!(cmd_summary(args).unwrap(), exit_codes::SUCCESS);

        let summary: TraceSummary =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(summary.overall.total_tasks, 2);
        // 0.32 and 1.0
        assert!((summary.overall.avg_final_score - 0.66).abs() < 1e-9);
        assert_eq!(summary.overall.disagreement_rate, 0.5);
        assert_eq!(summary.by_difficulty["Easy"].count, 1);
        assert_eq!(summary.by_difficulty["Hard"].count, 1);

        let missing = SummaryArgs {
            run_dir,
            source: TaskSource::Adversarial,
            out: None,
        };
        let err = cmd_summary(missing).unwrap_err();
        assert!(err.to_string().contains("no traces"));
    }
}
