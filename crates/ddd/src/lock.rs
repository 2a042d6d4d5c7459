//! `*.lock` sentinel files.
//!
//! A build that writes `out.glb` first creates `out.glb.lock` exclusively;
//! a second process targeting the same output fails instead of racing it.
//! The sentinel is removed when the [`OutputLock`] is dropped.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{DddError, Result};

/// Held lock on an output file.
#[derive(Debug)]
pub struct OutputLock {
    path: PathBuf,
}

/// Sentinel path for `output`.
pub fn lock_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

impl OutputLock {
    /// Creates `<output>.lock`.
    ///
    /// # Errors
    ///
    /// [`DddError::Io`] with kind `AlreadyExists` when another process holds
    /// the lock.
    pub fn acquire(output: impl AsRef<Path>) -> Result<Self> {
        let path = lock_path(output.as_ref());
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => DddError::Io(std::io::Error::new(
                    e.kind(),
                    format!("{} is locked by another build", path.display()),
                )),
                _ => DddError::Io(e),
            })?;
        writeln!(file, "{}", std::process::id())?;
        debug!(lock = %path.display(), "acquired");
        Ok(Self { path })
    }

    /// Path of the sentinel file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "could not release lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tile.glb");
        let lock = OutputLock::acquire(&out).unwrap();
        assert!(lock.path().ends_with("tile.glb.lock"));
        assert!(lock.path().exists());

        let err = OutputLock::acquire(&out).unwrap_err();
        assert!(matches!(err, DddError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));

        drop(lock);
        assert!(!lock_path(&out).exists());
        assert!(OutputLock::acquire(&out).is_ok());
    }
}
