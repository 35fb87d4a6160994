//! Machine-wide run lock
//!
//! Only one setup may run at a time. The lock is an advisory `flock` on a
//! well-known file and lives as long as the open descriptor, so a crashed
//! run never leaves a stale lock behind.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long to keep retrying before reporting a conflict
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run holds the lock at {}", .0.display())]
    Conflict(PathBuf),

    #[error("failed to lock {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held run lock, released on drop
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl fmt::Debug for RunLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RunLock {
    /// Acquire the lock, retrying until `timeout` elapses
    ///
    /// The parent directory is created if needed.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_err)?;

        let deadline = Instant::now() + timeout;
        loop {
            if try_flock_exclusive(&file).map_err(io_err)? {
                log::debug!("Acquired run lock {}", path.display());
                return Ok(Self {
                    _file: file,
                    path: path.to_path_buf(),
                });
            }
            if Instant::now() >= deadline {
                return Err(LockError::Conflict(path.to_path_buf()));
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }
}

/// Run `f` while holding the run lock
pub fn with_exclusive_run_lock<T>(
    path: &Path,
    timeout: Duration,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let _lock = RunLock::acquire(path, timeout)?;
    f()
}

/// Returns `Ok(false)` if another open descriptor holds the lock
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is a valid descriptor owned by `file` for the whole call
    #[allow(unsafe_code)]
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}
