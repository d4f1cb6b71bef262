//! Single-instance guard tied to an advisory OS file lock.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another worker is already running here (pid {0})")]
    HeldByPid(u32),
    #[error("another worker is already running here (pid unknown)")]
    HeldByUnknown,
    #[error("io error acquiring lock: {0}")]
    Io(#[from] std::io::Error),
}

/// An acquired process lock. Dropping it releases the OS lock but does not
/// delete the file; `release` additionally truncates the PID record so a
/// stale PID is never read as still-held.
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

/// Attempts to acquire the lock at `path` with zero timeout. On failure,
/// reads the PID recorded by the current holder for the error message.
pub fn acquire(path: &Path) -> Result<ProcessLock, LockError> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    if fs2::FileExt::try_lock_exclusive(&file).is_err() {
        let holder = read_holder_pid(path);
        return Err(match holder {
            Some(pid) => LockError::HeldByPid(pid),
            None => LockError::HeldByUnknown,
        });
    }

    let mut lock = ProcessLock {
        file,
        path: path.to_path_buf(),
    };
    lock.write_pid()?;
    Ok(lock)
}

fn read_holder_pid(path: &Path) -> Option<u32> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

impl ProcessLock {
    fn write_pid(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        write!(self.file, "{}", std::process::id())?;
        self.file.flush()
    }

    /// Releases the lock explicitly, ahead of a self-update handoff, so the
    /// replacement process can reacquire it immediately.
    pub fn release(self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::write(&self.path, b"");
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_in_same_process_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fishtest_worker.lock");
        let first = acquire(&path).unwrap();
        let second = acquire(&path);
        assert!(second.is_err());
        first.release();
    }

    #[test]
    fn reacquire_after_release_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fishtest_worker.lock");
        let first = acquire(&path).unwrap();
        first.release();
        let second = acquire(&path);
        assert!(second.is_ok());
    }

    #[test]
    fn error_message_carries_holder_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fishtest_worker.lock");
        let _first = acquire(&path).unwrap();
        let err = acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::HeldByPid(pid) if pid == std::process::id()));
    }
}
