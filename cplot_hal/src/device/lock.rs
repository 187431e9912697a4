//! Cross-process advisory device lock.
//!
//! One lock file per machine, `${TMPDIR:-/tmp}/cplot-axidraw.lock`, held
//! with a non-blocking exclusive `flock` for the whole session. The file
//! is stamped with `pid=<pid>` so a second process can say who is busy.

use cplot_common::consts::LOCK_FILE_NAME;
use cplot_common::hal::error::{DeviceError, DeviceResult};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::unistd::getpid;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Lock file location for this machine.
pub fn default_lock_path() -> PathBuf {
    let base = std::env::var_os("TMPDIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join(LOCK_FILE_NAME)
}

/// Content of a lock file, e.g. `pid=1234`.
pub fn read_holder(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Held lock; released on drop.
pub struct DeviceLock {
    file: Flock<File>,
    path: PathBuf,
}

impl DeviceLock {
    /// Acquire the lock at [`default_lock_path`].
    pub fn acquire() -> DeviceResult<Self> {
        Self::acquire_at(&default_lock_path())
    }

    /// Acquire the lock at `path` without blocking.
    ///
    /// # Errors
    ///
    /// `DeviceError::Busy` when another handle holds the lock,
    /// `DeviceError::Lock` when the file cannot be opened or locked.
    pub fn acquire_at(path: &Path) -> DeviceResult<Self> {
        let lock_error = |source: std::io::Error| DeviceError::Lock {
            path: path.display().to_string(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(lock_error)?;

        let file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => file,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                let holder = read_holder(path).unwrap_or_else(|| "holder unknown".to_string());
                warn!("Device lock {} is held ({holder})", path.display());
                return Err(DeviceError::Busy { holder });
            }
            Err((_, errno)) => return Err(lock_error(errno.into())),
        };

        let lock = Self {
            file,
            path: path.to_path_buf(),
        };
        if let Err(e) = lock.stamp() {
            warn!("Could not stamp {}: {e}", path.display());
        }
        info!("Device lock acquired: {}", path.display());
        Ok(lock)
    }

    fn stamp(&self) -> std::io::Result<()> {
        let mut file: &File = &self.file;
        file.set_len(0)?;
        writeln!(file, "pid={}", getpid())?;
        file.flush()
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DeviceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLock").field("path", &self.path).finish()
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        info!("Device lock released: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_busy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        let first = DeviceLock::acquire_at(&path).unwrap();
        let err = DeviceLock::acquire_at(&path).unwrap_err();
        assert!(err.is_busy(), "{err}");
        assert!(err.to_string().contains(&format!("pid={}", std::process::id())));
        drop(first);
        DeviceLock::acquire_at(&path).unwrap();
    }

    #[test]
    fn missing_directory_is_a_lock_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join(LOCK_FILE_NAME);
        assert!(matches!(
            DeviceLock::acquire_at(&path),
            Err(DeviceError::Lock { .. })
        ));
    }

    #[test]
    fn holder_of_empty_file_is_unknown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(read_holder(&path), None);
    }
}
