use super::Env;
use crate::proot::resolve_proot;
use crate::util::dir_size;

/// Init script a successful install writes into the rootfs; its presence is
/// the "installed" signal.
pub const INIT_SCRIPT: &str = "usr/local/bin/rootbox-init";

// Fixed size estimates reported before anything is downloaded.
const ROOTFS_ESTIMATED_BYTES: u64 = 1536 * 1024 * 1024;
const PROOT_ESTIMATED_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    Installed,
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallState::NotInstalled => write!(f, "not-installed"),
            InstallState::Installed => write!(f, "installed"),
        }
    }
}

/* Pure filesystem inspection; nothing here caches, so every query reflects
 * the on-disk state at call time. */
impl Env {
    pub fn installed(&self) -> bool {
        self.rootfs_dir.join(INIT_SCRIPT).is_file()
    }

    /// Readiness is defined as "rootfs/bin exists and is non-empty".
    pub fn rootfs_ready(&self) -> bool {
        let bin = self.rootfs_dir.join("bin");
        match std::fs::read_dir(&bin) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    pub fn proot_available(&self) -> bool {
        resolve_proot(self).is_some()
    }

    pub fn install_state(&self) -> InstallState {
        if self.installed() {
            InstallState::Installed
        } else {
            InstallState::NotInstalled
        }
    }

    pub fn storage_required(&self) -> u64 {
        ROOTFS_ESTIMATED_BYTES + PROOT_ESTIMATED_BYTES
    }

    pub fn storage_used(&self) -> u64 {
        dir_size(&self.root)
    }
}
