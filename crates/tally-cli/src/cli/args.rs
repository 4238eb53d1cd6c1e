use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_core::judge::TaskSource;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Hybrid judge scoring with cross-validated calibration, stability testing and reproducible run manifests"
)]
pub struct Cli {
    /// Config file (defaults to ./tally.yaml when present)
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Score recorded judgments
    Score(ScoreArgs),
    /// Tune scorer parameters by repeated K-fold cross-validation
    Calibrate(CalibrateArgs),
    /// Measure score spread over recorded repeat evaluations
    Stability(StabilityArgs),
    /// Print content digests
    Hash(HashArgs),
    /// Create or compare run manifests
    Manifest(ManifestArgs),
    /// Derive adversarial items from reference tasks
    Adversarial(AdversarialArgs),
    /// Aggregate metrics over the traces of one audited run
    Summary(SummaryArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScoreArgs {
    /// JSONL file of judgment records
    #[arg(long)]
    pub input: PathBuf,

    /// Write scores here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Audit traces and the run manifest go under <logs-dir>/<run-id>/
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Include the per-answer breakdown in each output line
    #[arg(long)]
    pub breakdown: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CalibrateArgs {
    /// JSONL file of labeled judgment records
    #[arg(long)]
    pub input: PathBuf,

    /// Output JSON path
    #[arg(long, default_value = "calibration.json")]
    pub out: PathBuf,

    /// Override calibration.seed
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StabilityArgs {
    /// JSONL file; records sharing a task_id are repeat evaluations
    #[arg(long)]
    pub input: PathBuf,

    /// Override stability.runs
    #[arg(long)]
    pub runs: Option<usize>,

    /// Override stability.threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Write the report here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Exit 1 when any task is unstable
    #[arg(long)]
    pub fail_on_unstable: bool,
}

#[derive(Parser, Debug)]
pub struct HashArgs {
    /// Override hashing.algorithm (sha256, blake3, md5)
    #[arg(long, global = true)]
    pub algorithm: Option<String>,

    #[command(subcommand)]
    pub cmd: HashSub,
}

#[derive(Subcommand, Debug)]
pub enum HashSub {
    /// Digest of a file's bytes
    File { path: PathBuf },
    /// Digest of a UTF-8 string
    Text { text: String },
    /// Digest of a prompt template bound to a version
    Prompt {
        /// File holding the template
        path: PathBuf,
        #[arg(long, default_value = "v1")]
        version: String,
    },
    /// Digest of the effective scorer configuration
    Config,
    /// Recompute a file's digest and compare (exit 1 on mismatch)
    Verify { digest: String, path: PathBuf },
}

#[derive(Parser, Debug)]
pub struct ManifestArgs {
    #[command(subcommand)]
    pub cmd: ManifestSub,
}

#[derive(Subcommand, Debug)]
pub enum ManifestSub {
    /// Stamp a dataset, prompts and the scorer config into a manifest
    Create(ManifestCreateArgs),
    /// List identity fields that differ (exit 1 when any do)
    Diff { left: PathBuf, right: PathBuf },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ManifestCreateArgs {
    #[arg(long)]
    pub dataset: PathBuf,

    /// Prompt template as NAME=PATH; the version comes from judge_versions[NAME]
    #[arg(long = "prompt", value_name = "NAME=PATH")]
    pub prompts: Vec<String>,

    /// Defaults to a fresh run_<timestamp>_<hex> id
    #[arg(long)]
    pub run_id: Option<String>,

    /// Override the recorded random seed (defaults to calibration.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value = "manifest.json")]
    pub out: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AdversarialArgs {
    /// JSONL file of reference tasks (task_id, question, gold_answer, rubric, difficulty_level)
    #[arg(long)]
    pub input: PathBuf,

    /// Write items here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Override adversarial.seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override adversarial.items_per_cell
    #[arg(long)]
    pub per_cell: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SummaryArgs {
    /// Run directory written by `score --logs-dir` (<logs-dir>/<run-id>)
    pub run_dir: PathBuf,

    /// Which trace file to read (canonical, adversarial)
    #[arg(long, default_value = "canonical")]
    pub source: TaskSource,

    /// Write the summary here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tally",
            "stability",
            "--input",
            "runs.jsonl",
            "--fail-on-unstable",
            "--config",
            "ci.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
        match cli.cmd {
            Command::Stability(a) => {
                assert!(a.fail_on_unstable);
                assert_eq!(a.runs, None);
            }
            _ => panic!("expected stability"),
        }
    }

    #[test]
    fn hash_subcommands() {
        let cli = Cli::try_parse_from(["tally", "hash", "--algorithm", "blake3", "text", "abc"]).unwrap();
        match cli.cmd {
            Command::Hash(h) => {
                assert_eq!(h.algorithm.as_deref(), Some("blake3"));
                assert!(matches!(h.cmd, HashSub::Text { ref text } if text == "abc"));
            }
            _ => panic!("expected hash"),
        }
        assert!(Cli::try_parse_from(["tally", "hash", "prompt"]).is_err());
    }

    #[test]
    fn manifest_create_collects_prompts() {
        let cli = Cli::try_parse_from([
            "tally",
            "manifest",
            "create",
            "--dataset",
            "d.jsonl",
            "--prompt",
            "semantic=prompts/semantic.txt",
            "--prompt",
            "numeric=prompts/numeric.txt",
        ])
        .unwrap();
        let Command::Manifest(m) = cli.cmd else {
            panic!("expected manifest");
        };
        let ManifestSub::Create(c) = m.cmd else {
            panic!("expected create");
        };
        assert_eq!(c.prompts.len(), 2);
        assert_eq!(c.out, PathBuf::from("manifest.json"));
    }

    #[test]
    fn summary_source_parses() {
        let cli = Cli::try_parse_from(["tally", "summary", "logs/run_1", "--source", "adversarial"])
            .unwrap();
        let Command::Summary(s) = cli.cmd else {
            panic!("expected summary");
        };
        assert_eq!(s.source, TaskSource::Adversarial);
        assert_eq!(s.run_dir, PathBuf::from("logs/run_1"));
        assert!(Cli::try_parse_from(["tally", "summary", "x", "--source", "golden"]).is_err());

        let cli = Cli::try_parse_from(["tally", "adversarial", "--input", "t.jsonl", "--per-cell", "2"])
            .unwrap();
        let Command::Adversarial(a) = cli.cmd else {
            panic!("expected adversarial");
        };
        assert_eq!(a.per_cell, Some(2));
        assert_eq!(a.seed, None);
    }
}
