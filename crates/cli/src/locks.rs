//! Repository lock for operations that mutate the stage set

use crate::error::{RepoError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on `.dvs/lock`
///
/// Held for the whole of add, commit and checkout. The kernel drops the
/// `flock` when the file closes, so the lock is released on every exit
/// path including panics and killed processes.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl RepoLock {
    /// Acquire the lock without blocking
    pub fn acquire(dvs_dir: &Path) -> Result<Self> {
        let path = dvs_dir.join("lock");
        let io_err = |source: std::io::Error| RepoError::Io {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        if !try_flock_exclusive(&file).map_err(io_err)? {
            return Err(RepoError::Locked {
                pid: read_pid(&mut file),
            });
        }

        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        tracing::debug!(lock = %path.display(), "acquired repository lock");
        Ok(Self { path, file })
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        tracing::debug!(lock = %self.path.display(), "released repository lock");
    }
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
#[allow(deprecated)]
fn try_flock_exclusive(file: &File) -> std::io::Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(std::io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquisition() {
        let temp_dir = TempDir::new().unwrap();

        let lock1 = RepoLock::acquire(temp_dir.path()).unwrap();

        // flock is per open file, so a second handle in this process conflicts
        match RepoLock::acquire(temp_dir.path()) {
            Err(RepoError::Locked { pid }) => assert_eq!(pid, Some(std::process::id())),
            other => panic!("expected lock conflict, got {:?}", other),
        }

        drop(lock1);
        assert!(RepoLock::acquire(temp_dir.path()).is_ok());
    }
}
