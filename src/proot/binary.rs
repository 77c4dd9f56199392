use crate::env::Env;
use std::path::PathBuf;

pub const PROOT_BIN: &str = "proot";
pub const LOADER_BIN: &str = "loader";

/* Resolution is recomputed on every lookup rather than cached: the candidate
 * set changes between runs (a first install finishing, a bundled copy
 * appearing), and the cost is three stat calls. */

/// Resolves the proot binary. Preference order: vendor-extracted, bundled,
/// legacy location from older installs.
pub fn resolve_proot(env: &Env) -> Option<PathBuf> {
    first_existing(&[
        env.vendor_dir.join(PROOT_BIN),
        env.bundled_dir.join(PROOT_BIN),
        env.root.join(PROOT_BIN),
    ])
}

/// Resolves the loader helper proot executes through, same preference order
/// as the main binary minus the legacy location.
pub fn resolve_loader(env: &Env) -> Option<PathBuf> {
    first_existing(&[
        env.vendor_dir.join(LOADER_BIN),
        env.bundled_dir.join(LOADER_BIN),
    ])
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}
