//! Process exit codes. Part of the CLI contract; scripts branch on them.

pub const SUCCESS: i32 = 0;
/// The command ran but the outcome is a failure (unstable tasks with
/// `--fail-on-unstable`, manifests that differ, digest mismatch).
pub const DOMAIN_FAILURE: i32 = 1;
/// Bad config, unreadable input, or a malformed experiment design.
pub const CONFIG_ERROR: i32 = 2;
