use crate::cli::args::{HashArgs, HashSub};
use crate::exit_codes;
use tally_core::config::TallyConfig;
use tally_core::hashing::{Digest, HashAlgorithm, ReproducibilityHasher};

pub fn cmd_hash(args: HashArgs, cfg: &TallyConfig) -> anyhow::Result<i32> {
    let algorithm = match &args.algorithm {
        Some(name) => name.parse::<HashAlgorithm>()?,
        None => cfg.hashing.algorithm,
    };
    let hasher = ReproducibilityHasher::new(algorithm);

    let digest = match args.cmd {
        HashSub::File { path } => hasher.hash_file(&path)?,
        HashSub::Text { text } => hasher.hash_string(&text),
        HashSub::Prompt { path, version } => {
            let template = std::fs::read_to_string(&path)?;
            hasher.hash_prompt(&template, &version)
        }
        HashSub::Config => hasher.hash_dict(&cfg.scorer)?,
        HashSub::Verify { digest, path } => {
            let expected: Digest = digest.parse()?;
            if ReproducibilityHasher::verify_file(&expected, &path)? {
                println!("ok {}", path.display());
                return Ok(exit_codes::SUCCESS);
            }
            println!("mismatch {}", path.display());
            return Ok(exit_codes::DOMAIN_FAILURE);
        }
    };
    println!("{digest}");
    Ok(exit_codes::SUCCESS)
}
