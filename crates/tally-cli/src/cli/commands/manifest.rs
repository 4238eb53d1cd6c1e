use crate::cli::args::{ManifestArgs, ManifestCreateArgs, ManifestSub};
use crate::exit_codes;
use anyhow::Context;
use tally_core::config::TallyConfig;
use tally_core::manifest::{generate_run_id, RunManifest};

pub fn cmd_manifest(args: ManifestArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    match args.cmd {
        ManifestSub::Create(create) => cmd_create(create, cfg),
        ManifestSub::Diff { left, right } => {
            let a = RunManifest::read(&left)?;
            let b = RunManifest::read(&right)?;
            let changes = a.diff(&b);
            if changes.is_empty() {
                println!("manifests match ({} vs {})", a.run_id, b.run_id);
                return Ok(exit_codes::SUCCESS);
            }
            for c in &changes {
                println!(
                    "{}: {} -> {}",
                    c.field,
                    c.left.as_deref().unwrap_or("<absent>"),
                    c.right.as_deref().unwrap_or("<absent>")
                );
            }
            Ok(exit_codes::DOMAIN_FAILURE)
        }
    }
}

fn cmd_create(args: ManifestCreateArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    let hasher = cfg.hashing.hasher();
    let run_id = args.run_id.unwrap_or_else(generate_run_id);
    let seed = args.seed.unwrap_or(cfg.calibration.seed);

    let mut manifest = RunManifest::create(run_id, &args.dataset, &hasher, cfg.scorer, seed)?
        .with_judge_versions(cfg.judge_versions.clone());

    for spec in &args.prompts {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("config error: --prompt expects NAME=PATH, got '{spec}'"))?;
        let template = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt template {path}"))?;
        let version = cfg
            .judge_versions
            .get(name)
            .map(String::as_str)
            .unwrap_or("v1");
        manifest.add_prompt(&hasher, name, &template, version);
    }

    manifest.write(&args.out)?;
    eprintln!("wrote {} ({})", args.out.display(), manifest.run_id);
    Ok(exit_codes::SUCCESS)
}
