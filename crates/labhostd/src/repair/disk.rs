//! Freeing space on a full filesystem
//!
//! Only `/tmp` and `/var/tmp` are ever erased; a full filesystem without
//! either of them on it is not something automated repair can fix.

use crate::host::Host;
use crate::machine::Machine;
use crate::mountpoint::tmp_dirs_on;
use labhost_common::{HostResult, RunOptions};
use std::time::Duration;
use tracing::{info, warn};

const ERASE_TIMEOUT: Duration = Duration::from_secs(3600);

impl<M: Machine> Host<M> {
    /// Remove everything inside `path`, keeping the directory itself.
    /// Failures of the removal are ignored.
    pub fn erase_dir_contents(&mut self, path: &str) -> HostResult<()> {
        info!("Erasing contents of {} on {}", path, self.hostname());
        let command = format!(
            "find \"{}\" -mindepth 1 -maxdepth 1 -print0 | xargs -0 rm -rf",
            path
        );
        self.machine.run(
            &command,
            RunOptions::default()
                .ignoring_status()
                .with_timeout(ERASE_TIMEOUT),
        )?;
        self.files_removed = true;
        Ok(())
    }

    /// Erase the temp dirs that live on `mountpoint`
    pub fn repair_full_disk(&mut self, mountpoint: &str) -> HostResult<()> {
        let dirs = tmp_dirs_on(&self.machine, mountpoint)?;
        if dirs.is_empty() {
            warn!(
                "No erasable directory on {} of {}",
                mountpoint,
                self.hostname()
            );
        }
        for dir in dirs {
            self.erase_dir_contents(dir)?;
        }
        Ok(())
    }
}
