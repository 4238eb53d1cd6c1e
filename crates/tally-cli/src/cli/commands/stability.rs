use super::{emit, read_records};
use crate::cli::args::StabilityArgs;
use crate::exit_codes;
use std::sync::Arc;
use tally_core::config::TallyConfig;
use tally_core::judge::group_by_task;
use tally_core::stability::RecordedRunsEvaluator;

pub async fn cmd_stability(args: StabilityArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    let records = read_records(&args.input)?;
    let tasks = group_by_task(&records);

    let mut settings = cfg.stability;
    if let Some(runs) = args.runs {
        settings.runs = runs;
    }
    if let Some(threshold) = args.threshold {
        settings.threshold = threshold;
    }
    TallyConfig {
        stability: settings,
        ..cfg.clone()
    }
    .validate()?;

    let report = settings
        .tester()
        .test(tasks, Arc::new(RecordedRunsEvaluator::new(cfg.scorer)))
        .await;

    emit(args.out.as_deref(), &serde_json::to_string_pretty(&report)?)?;
    eprintln!(
        "stability {:.1}% over {} tasks (avg std {:.4}, max std {:.4})",
        report.overall_stability * 100.0,
        report.per_task_results.len(),
        report.avg_std,
        report.max_std
    );
    if !report.unstable_task_ids.is_empty() {
        eprintln!("unstable: {}", report.unstable_task_ids.join(", "));
    }

    if args.fail_on_unstable && !report.is_fully_stable() {
        return Ok(exit_codes::DOMAIN_FAILURE);
    }
    Ok(exit_codes::SUCCESS)
}
