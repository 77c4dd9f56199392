use super::{Env, InstallState};
use anyhow::{Context, Result};
use log::{debug, trace};

impl Env {
    /// Removes the environment root wholesale and notifies `on_state` with
    /// the resulting install state.
    pub fn delete(
        &self,
        on_state: &mut dyn FnMut(InstallState),
    ) -> Result<()> {
        trace!("Removing environment root: {}", self.root.display());
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).context(format!(
                "Failed to remove environment root {}",
                self.root.display()
            ))?;
        } else {
            debug!(
                "Environment root does not exist: {}",
                self.root.display()
            );
        }

        on_state(InstallState::NotInstalled);
        Ok(())
    }
}
