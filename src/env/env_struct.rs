use crate::config::Config;
use std::path::{Path, PathBuf};

/* All state of a rootbox environment is path-scoped under one root
 * directory; two environments with different roots never share anything. */
pub struct Env {
    pub root: PathBuf,
    /// Staging area for fetched archives, removed after successful extraction.
    pub downloads_dir: PathBuf,
    /// The materialized Linux filesystem tree.
    pub rootfs_dir: PathBuf,
    /// proot binary and loader extracted from the vendor .deb.
    pub vendor_dir: PathBuf,
    /// Private data directory bind-mounted into the environment.
    pub data_dir: PathBuf,
    /// Scratch directory handed to proot via PROOT_TMP_DIR.
    pub tmp_dir: PathBuf,
    /// Directory holding a bundled proot/loader shipped alongside rootbox.
    pub bundled_dir: PathBuf,
}

impl Env {
    pub fn at(root: &Path, bundled_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            downloads_dir: root.join("downloads"),
            rootfs_dir: root.join("rootfs"),
            vendor_dir: root.join("termux-proot"),
            data_dir: root.join("data"),
            tmp_dir: root.join("tmp"),
            bundled_dir: bundled_dir.to_path_buf(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::at(&config.root, &config.bundled_dir)
    }
}
