//! Advisory file locks with bounded waiting

use crate::Result;
use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// Outcome of a bounded lock attempt
pub(crate) enum LockOutcome {
    Acquired(LockGuard),
    /// Another holder kept the lock past the timeout
    Unavailable,
}

/// Holds a lock until dropped
pub(crate) struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("Failed to release {:?} lock on {:?}: {}", self.mode, self.path, e);
        } else {
            trace!("Released {:?} lock on {:?}", self.mode, self.path);
        }
    }
}

fn open_lock_file(path: &Path, mode: LockMode) -> io::Result<File> {
    match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
    {
        Ok(file) => Ok(file),
        // readers in a read-only directory can still lock an existing file
        Err(e) if mode == LockMode::Shared && e.kind() == io::ErrorKind::PermissionDenied => {
            File::open(path)
        }
        Err(e) => Err(e),
    }
}

/// Poll a non-blocking lock on `path` until it is granted or `timeout` passes
pub(crate) fn acquire(
    path: &Path,
    mode: LockMode,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<LockOutcome> {
    let file = open_lock_file(path, mode)?;
    let started = Instant::now();

    loop {
        let attempt = match mode {
            LockMode::Shared => file.try_lock_shared(),
            LockMode::Exclusive => file.try_lock(),
        };
        match attempt {
            Ok(()) => {
                trace!("Acquired {:?} lock on {:?}", mode, path);
                return Ok(LockOutcome::Acquired(LockGuard {
                    file,
                    path: path.to_path_buf(),
                    mode,
                }));
            }
            Err(TryLockError::WouldBlock) => {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Ok(LockOutcome::Unavailable);
                }
                std::thread::sleep(poll_interval.min(timeout - elapsed));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(50);
    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_shared_locks_coexist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.bsi.lock");

        let first = acquire(&path, LockMode::Shared, SHORT, POLL).unwrap();
        let second = acquire(&path, LockMode::Shared, SHORT, POLL).unwrap();
        assert!(matches!(first, LockOutcome::Acquired(_)));
        assert!(matches!(second, LockOutcome::Acquired(_)));
    }

    #[test]
    fn test_exclusive_excludes_until_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("b.bsi.lock");

        let held = acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap();
        assert!(matches!(held, LockOutcome::Acquired(_)));

        let started = Instant::now();
        let blocked = acquire(&path, LockMode::Shared, SHORT, POLL).unwrap();
        assert!(matches!(blocked, LockOutcome::Unavailable));
        assert!(started.elapsed() >= SHORT);

        drop(held);
        let after = acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap();
        assert!(matches!(after, LockOutcome::Acquired(_)));
    }

    #[test]
    fn test_missing_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent").join("c.bsi.lock");
        assert!(acquire(&path, LockMode::Exclusive, SHORT, POLL).is_err());
    }
}
