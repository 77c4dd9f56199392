use super::impls::deserialize_level_filter;
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf};

/// Default rootfs tarball: a gzip-compressed Linux base image.
pub const DEFAULT_ROOTFS_URL: &str = "https://cdimage.ubuntu.com/ubuntu-base/releases/24.04/release/ubuntu-base-24.04-base-arm64.tar.gz";

/// Default proot build, shipped as a .deb whose data.tar member carries the
/// binary and its loader.
pub const DEFAULT_PROOT_URL: &str = "https://packages.termux.dev/apt/termux-main/pool/main/p/proot/proot_5.1.107-65_aarch64.deb";

#[derive(Deserialize, Default, Clone)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub root: Option<String>,
    pub user: Option<String>,
    pub rootfs_url: Option<String>,
    pub proot_url: Option<String>,
    pub bundled_dir: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub log_level: log::LevelFilter,
    /// Environment root; everything rootbox writes lives below it.
    pub root: PathBuf,
    /// User identity presented inside the environment (picks the workdir).
    pub user: String,
    pub rootfs_url: String,
    pub proot_url: String,
    /// Where a bundled proot/loader pair would be, if one ships with the host.
    pub bundled_dir: PathBuf,
    /// Where each setting came from (default, config file, environment, cli).
    pub sources: HashMap<String, String>,
}
