use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolves the current user's home directory, preferring $HOME and falling
/// back to the passwd database.
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    let user = nix::unistd::User::from_uid(nix::unistd::getuid())
        .context("Failed to look up current user")?
        .context("Current uid has no passwd entry")?;
    Ok(user.dir)
}

/// Expands a path that starts with ~ to use the user's home directory
pub fn expand_tilde_path(path: &Path) -> Result<PathBuf> {
    let Some(path_str) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if path_str.starts_with('~') {
        if path_str == "~" {
            return home_dir();
        } else if let Some(rest) = path_str.strip_prefix("~/") {
            return Ok(home_dir()?.join(rest));
        }
    }
    Ok(path.to_path_buf())
}
