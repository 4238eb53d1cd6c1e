use super::args::*;
use crate::exit_codes;
use std::path::Path;
use tally_core::config::{load_or_default, TallyConfig};

pub mod adversarial;
pub mod calibrate;
pub mod hash;
pub mod manifest;
pub mod score;
pub mod stability;
pub mod summary;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let cfg = load_or_default(cli.config.as_deref())?;
    match cli.cmd {
        Command::Score(args) => score::cmd_score(args, &cfg),
        Command::Calibrate(args) => calibrate::cmd_calibrate(args, &cfg).await,
        Command::Stability(args) => stability::cmd_stability(args, &cfg).await,
        Command::Hash(args) => hash::cmd_hash(args, &cfg),
        Command::Manifest(args) => manifest::cmd_manifest(args, &cfg),
        Command::Adversarial(args) => adversarial::cmd_adversarial(args, &cfg),
        Command::Summary(args) => summary::cmd_summary(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Writes `body` to `out`, or prints it when no path is given.
pub(crate) fn emit(out: Option<&Path>, body: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, body)?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

pub(crate) fn read_records(path: &Path) -> anyhow::Result<Vec<tally_core::JudgmentRecord>> {
    let records = tally_core::judge::read_records(path)?;
    if records.is_empty() {
        anyhow::bail!("config error: {} has no records", path.display());
    }
    Ok(records)
}

pub(crate) fn describe_cv(cfg: &TallyConfig) -> String {
    format!(
        "folds={} repeats={} seed={} combos={}",
        cfg.calibration.folds,
        cfg.calibration.repeats,
        cfg.calibration.seed,
        cfg.calibration.grid.n_combinations()
    )
}
