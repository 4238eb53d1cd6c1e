use super::{describe_cv, read_records};
use crate::cli::args::CalibrateArgs;
use crate::exit_codes;
use std::sync::Arc;
use tally_core::calibration::ReplayEvaluator;
use tally_core::config::TallyConfig;

pub async fn cmd_calibrate(args: CalibrateArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    let records = read_records(&args.input)?;
    let mut settings = cfg.calibration.clone();
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }

    let labeled = records.iter().filter(|r| r.expected_outcome.is_some()).count();
    if labeled == 0 {
        anyhow::bail!(
            "config error: {} has no records with expected_outcome",
            args.input.display()
        );
    }
    tracing::info!(records = records.len(), labeled, "calibrating");

    let evaluator = Arc::new(ReplayEvaluator::new(cfg.scorer));
    let report = settings
        .calibrator()
        .run(records, &settings.grid, evaluator)
        .await?;

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, &json)?;
    eprintln!("wrote {}", args.out.display());

    let stats = &report.cv_stats;
    eprintln!("\nCalibration Summary:");
    eprintln!(
        "  {}",
        describe_cv(&TallyConfig {
            calibration: settings,
            ..cfg.clone()
        })
    );
    eprintln!("  best: {}", report.best_params);
    eprintln!(
        "  mean score {:.3} (std {:.3}, worst {:.3})",
        stats.best_mean_score, stats.best_std_score, stats.best_worst_score
    );
    if stats.n_failed_cells > 0 {
        eprintln!("  failed cells: {}", stats.n_failed_cells);
    }
    for (param, s) in &report.sensitivity_analysis {
        eprintln!(
            "  {param}: range {:.3}{}",
            s.range,
            if s.critical { " (critical)" } else { "" }
        );
    }

    Ok(exit_codes::SUCCESS)
}
