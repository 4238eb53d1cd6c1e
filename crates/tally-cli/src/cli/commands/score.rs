use super::{emit, read_records};
use crate::cli::args::ScoreArgs;
use crate::exit_codes;
use serde::Serialize;
use tally_core::audit::{AuditLog, TaskTrace};
use tally_core::config::TallyConfig;
use tally_core::manifest::{generate_run_id, RunManifest};
use tally_core::scorer::{ErrorKind, HybridScore, HybridScorer, ScoreBreakdown};

#[derive(Serialize)]
struct ScoreLine<'a> {
    task_id: &'a str,
    score: &'a HybridScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<&'a ScoreBreakdown>,
}

pub fn cmd_score(args: ScoreArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    let records = read_records(&args.input)?;
    let scorer = HybridScorer::try_new(cfg.scorer)?;

    let audit = match &args.logs_dir {
        Some(dir) => Some(AuditLog::create(dir, generate_run_id())?),
        None => None,
    };

    let mut lines = Vec::with_capacity(records.len());
    let mut failed = 0usize;
    for r in &records {
        let scored = scorer.compute_with_breakdown(
            &r.semantic,
            &r.numeric,
            &r.contradiction,
            &r.model_answer,
            &r.gold_answer,
        );
        if scored.score.has_error(ErrorKind::AllJudgesFailed) {
            failed += 1;
        }
        lines.push(serde_json::to_string(&ScoreLine {
            task_id: &r.task_id,
            score: &scored.score,
            breakdown: args.breakdown.then_some(&scored.breakdown),
        })?);
        if let Some(log) = &audit {
            log.log_trace(&TaskTrace::from_record(r, scored.score))?;
        }
    }
    emit(args.out.as_deref(), &lines.join("\n"))?;

    if let Some(log) = &audit {
        let hasher = cfg.hashing.hasher();
        let mut manifest = RunManifest::create(
            log.run_id(),
            &args.input,
            &hasher,
            cfg.scorer,
            cfg.calibration.seed,
        )?
        .with_judge_versions(cfg.judge_versions.clone());
        manifest.record_counts(records.len(), records.len() - failed, failed);
        log.log_manifest(&manifest)?;

        let stats = log.stats()?;
        eprintln!(
            "audit {}: {} canonical, {} adversarial, {} judge errors",
            stats.run_id, stats.canonical_traces, stats.adversarial_traces, stats.total_errors
        );
    }

    eprintln!("scored {} records ({} with every judge down)", records.len(), failed);
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RECORD: &str = r#"{"task_id": 7, "source": "adversarial", "model_answer": "I'm not sure, maybe 40", "gold_answer": "42", "semantic": {"score": 0.8, "confidence": 0.9}, "numeric": {"score": 0.0, "confidence": 0.0, "ok": false}, "contradiction": {"score": 0.0, "confidence": 0.5, "violated": null}}"#;

    #[test]
    fn scores_and_audits_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let mut f = std::fs::File::create(&input).unwrap();
        writeln!(f, "{RECORD}").unwrap();
        drop(f);

        let out = dir.path().join("scores.jsonl");
        let logs = dir.path().join("logs");
        let args = ScoreArgs {
            input,
            out: Some(out.clone()),
            logs_dir: Some(logs.clone()),
            breakdown: true,
        };
        assert_eq!(cmd_score(args, &TallyConfig::default()).unwrap(), exit_codes::SUCCESS);

        let line: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(line["task_id"], "7");
        // semantic only, minus the hedging penalty
        let final_score = line["score"]["final_score"].as_f64().unwrap();
        assert!((final_score - 0.7).abs() < 1e-9);
        assert!(line["breakdown"]["hedging_phrases"].as_array().unwrap().len() >= 1);

        let runs = tally_core::audit::list_runs(&logs).unwrap();
        assert_eq!(runs.len(), 1);
        let run_dir = logs.join(&runs[0]);
        assert!(run_dir.join("adversarial_traces.jsonl").exists());
        let manifest = RunManifest::read(&run_dir.join("manifest.json")).unwrap();
        assert_eq!(manifest.total_tasks, 1);
        assert_eq!(manifest.failed_tasks, 0);
    }
}
